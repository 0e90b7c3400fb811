use crate::types::{
    EnvironmentRef, KubernetesResource, KubernetesResourceCreateParameters,
    KubernetesResourcePatchParameters, ResourceRef,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    Authentication,

    #[error("Azure DevOps API returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// The subset of the Azure DevOps task agent API that manages Kubernetes
/// environment resources.
///
/// Implementations are shared between concurrently running callers, so they
/// must be reentrant and must not require `&mut self`.
#[async_trait]
pub trait TaskAgentClient: Send + Sync {
    async fn get_kubernetes_resource(&self, resource: &ResourceRef)
        -> ClientResult<KubernetesResource>;

    async fn add_kubernetes_resource(
        &self,
        environment: &EnvironmentRef,
        params: KubernetesResourceCreateParameters,
    ) -> ClientResult<KubernetesResource>;

    async fn update_kubernetes_resource(
        &self,
        resource: &ResourceRef,
        params: KubernetesResourcePatchParameters,
    ) -> ClientResult<KubernetesResource>;

    async fn delete_kubernetes_resource(&self, resource: &ResourceRef) -> ClientResult<()>;

    fn client_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct MockClient;

    #[async_trait]
    impl TaskAgentClient for MockClient {
        async fn get_kubernetes_resource(
            &self,
            resource: &ResourceRef,
        ) -> ClientResult<KubernetesResource> {
            Err(ClientError::NotFound {
                resource: resource.to_string(),
            })
        }

        async fn add_kubernetes_resource(
            &self,
            environment: &EnvironmentRef,
            params: KubernetesResourceCreateParameters,
        ) -> ClientResult<KubernetesResource> {
            Ok(KubernetesResource {
                id: 1,
                name: params.name,
                resource_type: None,
                namespace: params.namespace,
                cluster_name: params.cluster_name,
                service_endpoint_id: params.service_endpoint_id,
                tags: params.tags,
                environment_reference: Some(crate::types::EnvironmentReference {
                    id: environment.environment_id,
                    name: None,
                }),
                created_on: None,
                last_modified_on: None,
            })
        }

        async fn update_kubernetes_resource(
            &self,
            _resource: &ResourceRef,
            _params: KubernetesResourcePatchParameters,
        ) -> ClientResult<KubernetesResource> {
            Err(ClientError::Api {
                status: 400,
                message: "unsupported".to_string(),
            })
        }

        async fn delete_kubernetes_resource(&self, _resource: &ResourceRef) -> ClientResult<()> {
            Ok(())
        }

        fn client_name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_client() {
        let client = MockClient;
        let environment = EnvironmentRef::new("proj", 4);

        let created = client
            .add_kubernetes_resource(
                &environment,
                KubernetesResourceCreateParameters::new("web", Uuid::nil()),
            )
            .await
            .unwrap();
        assert_eq!(created.name, "web");
        assert_eq!(created.environment_reference.unwrap().id, 4);

        let missing = client
            .get_kubernetes_resource(&environment.resource(1))
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "Not found: proj/4/1");

        client
            .delete_kubernetes_resource(&environment.resource(1))
            .await
            .unwrap();
        assert_eq!(client.client_name(), "mock");
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::Api {
            status: 400,
            message: "Environment 9 not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Azure DevOps API returned 400: Environment 9 not found"
        );
        assert!(!err.is_not_found());
    }
}
