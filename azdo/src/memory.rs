//! An in-process stand-in for the Azure DevOps task agent API.
//!
//! It enforces the same referential rules the service does (the environment
//! and the service endpoint must exist before a resource can be attached)
//! and can simulate an eventually consistent delete, which keeps a deleted
//! resource readable for a configurable number of reads.

use crate::client::{ClientError, ClientResult, TaskAgentClient};
use crate::types::{
    EnvironmentReference, EnvironmentRef, EnvironmentResourceType, KubernetesResource,
    KubernetesResourceCreateParameters, KubernetesResourcePatchParameters, ResourceRef,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    environments: HashSet<EnvironmentRef>,
    service_endpoints: HashSet<(String, Uuid)>,
    resources: BTreeMap<ResourceRef, KubernetesResource>,
    // deleted resources that stay visible for N more reads
    lingering: HashMap<ResourceRef, (KubernetesResource, usize)>,
    next_id: i32,
}

#[derive(Default)]
pub struct InMemoryTaskAgentClient {
    tables: Mutex<Tables>,
    delete_lag: AtomicUsize,
    unavailable: AtomicBool,
    request_count: AtomicUsize,
}

impl InMemoryTaskAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(self, project: impl Into<String>, environment_id: i32) -> Self {
        self.register_environment(project, environment_id);
        self
    }

    pub fn with_service_endpoint(self, project: impl Into<String>, endpoint_id: Uuid) -> Self {
        self.register_service_endpoint(project, endpoint_id);
        self
    }

    /// Keeps each deleted resource readable for `reads` further reads.
    pub fn with_delete_lag(self, reads: usize) -> Self {
        self.delete_lag.store(reads, Ordering::SeqCst);
        self
    }

    pub fn register_environment(&self, project: impl Into<String>, environment_id: i32) {
        self.lock()
            .environments
            .insert(EnvironmentRef::new(project, environment_id));
    }

    pub fn register_service_endpoint(&self, project: impl Into<String>, endpoint_id: Uuid) {
        self.lock()
            .service_endpoints
            .insert((project.into(), endpoint_id));
    }

    /// Makes every subsequent call fail with `ServiceUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    pub fn resources(&self) -> Vec<KubernetesResource> {
        self.lock().resources.values().cloned().collect()
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // a panic while holding the lock cannot leave the tables half-written
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_request(&self) -> ClientResult<()> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClientError::ServiceUnavailable {
                message: "simulated outage".to_string(),
            });
        }
        Ok(())
    }

    fn require_environment(tables: &Tables, environment: &EnvironmentRef) -> ClientResult<()> {
        if tables.environments.contains(environment) {
            Ok(())
        } else {
            Err(ClientError::NotFound {
                resource: format!("environment {}", environment),
            })
        }
    }
}

#[async_trait]
impl TaskAgentClient for InMemoryTaskAgentClient {
    async fn get_kubernetes_resource(
        &self,
        resource: &ResourceRef,
    ) -> ClientResult<KubernetesResource> {
        self.begin_request()?;
        let mut tables = self.lock();

        if let Some(found) = tables.resources.get(resource) {
            return Ok(found.clone());
        }

        let stale = match tables.lingering.get_mut(resource) {
            Some((stale, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(stale.clone())
            }
            _ => None,
        };
        match stale {
            Some(stale) => {
                debug!("Serving deleted resource {} from lagging replica", resource);
                Ok(stale)
            }
            None => {
                tables.lingering.remove(resource);
                Err(ClientError::NotFound {
                    resource: resource.to_string(),
                })
            }
        }
    }

    async fn add_kubernetes_resource(
        &self,
        environment: &EnvironmentRef,
        params: KubernetesResourceCreateParameters,
    ) -> ClientResult<KubernetesResource> {
        self.begin_request()?;
        let mut tables = self.lock();

        Self::require_environment(&tables, environment)?;
        if params.name.trim().is_empty() {
            return Err(ClientError::Api {
                status: 400,
                message: "Resource name cannot be empty".to_string(),
            });
        }
        if !tables
            .service_endpoints
            .contains(&(environment.project.clone(), params.service_endpoint_id))
        {
            return Err(ClientError::Api {
                status: 400,
                message: format!(
                    "Service endpoint {} was not found in project {}",
                    params.service_endpoint_id, environment.project
                ),
            });
        }

        tables.next_id += 1;
        let now = Utc::now();
        let resource = KubernetesResource {
            id: tables.next_id,
            name: params.name,
            resource_type: Some(EnvironmentResourceType::Kubernetes),
            namespace: params.namespace,
            cluster_name: params.cluster_name,
            service_endpoint_id: params.service_endpoint_id,
            tags: params.tags,
            environment_reference: Some(EnvironmentReference {
                id: environment.environment_id,
                name: None,
            }),
            created_on: Some(now),
            last_modified_on: Some(now),
        };
        tables
            .resources
            .insert(environment.resource(resource.id), resource.clone());
        Ok(resource)
    }

    async fn update_kubernetes_resource(
        &self,
        resource: &ResourceRef,
        params: KubernetesResourcePatchParameters,
    ) -> ClientResult<KubernetesResource> {
        self.begin_request()?;
        let mut tables = self.lock();

        let existing = tables
            .resources
            .get_mut(resource)
            .ok_or_else(|| ClientError::NotFound {
                resource: resource.to_string(),
            })?;

        if let Some(name) = params.name {
            if name.trim().is_empty() {
                return Err(ClientError::Api {
                    status: 400,
                    message: "Resource name cannot be empty".to_string(),
                });
            }
            existing.name = name;
        }
        if let Some(tags) = params.tags {
            existing.tags = tags;
        }
        existing.last_modified_on = Some(Utc::now());
        Ok(existing.clone())
    }

    async fn delete_kubernetes_resource(&self, resource: &ResourceRef) -> ClientResult<()> {
        self.begin_request()?;
        let mut tables = self.lock();

        let removed = tables
            .resources
            .remove(resource)
            .ok_or_else(|| ClientError::NotFound {
                resource: resource.to_string(),
            })?;

        let lag = self.delete_lag.load(Ordering::SeqCst);
        if lag > 0 {
            tables.lingering.insert(resource.clone(), (removed, lag));
        }
        Ok(())
    }

    fn client_name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = "proj";

    fn endpoint() -> Uuid {
        Uuid::from_u128(0x5eed)
    }

    fn client() -> InMemoryTaskAgentClient {
        InMemoryTaskAgentClient::new()
            .with_environment(PROJECT, 1)
            .with_service_endpoint(PROJECT, endpoint())
    }

    #[tokio::test]
    async fn test_create_read_delete() {
        let client = client();
        let environment = EnvironmentRef::new(PROJECT, 1);

        let created = client
            .add_kubernetes_resource(
                &environment,
                KubernetesResourceCreateParameters::new("web", endpoint()),
            )
            .await
            .unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(client.resource_count(), 1);

        let key = environment.resource(created.id);
        let read = client.get_kubernetes_resource(&key).await.unwrap();
        assert_eq!(read, created);

        client.delete_kubernetes_resource(&key).await.unwrap();
        assert!(client
            .get_kubernetes_resource(&key)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(client
            .delete_kubernetes_resource(&key)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_create_requires_environment_and_endpoint() {
        let client = client();

        let err = client
            .add_kubernetes_resource(
                &EnvironmentRef::new(PROJECT, 99),
                KubernetesResourceCreateParameters::new("web", endpoint()),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = client
            .add_kubernetes_resource(
                &EnvironmentRef::new(PROJECT, 1),
                KubernetesResourceCreateParameters::new("web", Uuid::nil()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 400, .. }));
        assert_eq!(client.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_update_touches_only_given_fields() {
        let client = client();
        let environment = EnvironmentRef::new(PROJECT, 1);
        let created = client
            .add_kubernetes_resource(
                &environment,
                KubernetesResourceCreateParameters::new("web", endpoint())
                    .with_namespace("apps")
                    .with_tags(vec!["blue".to_string()]),
            )
            .await
            .unwrap();

        let updated = client
            .update_kubernetes_resource(
                &environment.resource(created.id),
                KubernetesResourcePatchParameters {
                    name: Some("api".to_string()),
                    tags: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "api");
        assert_eq!(updated.namespace.as_deref(), Some("apps"));
        assert_eq!(updated.tags, vec!["blue".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_lag_keeps_resource_visible() {
        let client = client().with_delete_lag(2);
        let environment = EnvironmentRef::new(PROJECT, 1);
        let created = client
            .add_kubernetes_resource(
                &environment,
                KubernetesResourceCreateParameters::new("web", endpoint()),
            )
            .await
            .unwrap();
        let key = environment.resource(created.id);

        client.delete_kubernetes_resource(&key).await.unwrap();
        assert_eq!(client.resource_count(), 0);

        assert!(client.get_kubernetes_resource(&key).await.is_ok());
        assert!(client.get_kubernetes_resource(&key).await.is_ok());
        assert!(client
            .get_kubernetes_resource(&key)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_outage() {
        let client = client();
        client.set_unavailable(true);

        let err = client
            .get_kubernetes_resource(&ResourceRef::new(PROJECT, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ServiceUnavailable { .. }));
        assert_eq!(client.request_count(), 1);
    }
}
