use crate::client::{ClientError, ClientResult, TaskAgentClient};
use crate::config::AzdoConfig;
use crate::types::{
    EnvironmentRef, KubernetesResource, KubernetesResourceCreateParameters,
    KubernetesResourcePatchParameters, ResourceRef,
};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Error body returned by Azure DevOps for rejected requests.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(rename = "typeKey", default)]
    type_key: Option<String>,
}

/// `TaskAgentClient` backed by the Azure DevOps REST API.
///
/// The inner `reqwest::Client` pools connections, so one instance is meant
/// to be shared (behind an `Arc`) by every caller talking to the same
/// organization.
pub struct HttpTaskAgentClient {
    client: reqwest::Client,
    base_url: Url,
    config: AzdoConfig,
}

impl HttpTaskAgentClient {
    pub fn new(config: AzdoConfig) -> ClientResult<Self> {
        config
            .validate()
            .map_err(|message| ClientError::InvalidConfig { message })?;

        let base_url =
            Url::parse(&config.organization_url).map_err(|e| ClientError::InvalidConfig {
                message: format!("Invalid organization URL {}: {}", config.organization_url, e),
            })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidConfig {
                message: format!("Organization URL cannot be a base: {}", base_url),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::InvalidConfig {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(AzdoConfig::from_env()?)
    }

    fn environment_url(&self, environment: &EnvironmentRef, tail: &[&str]) -> ClientResult<Url> {
        let environment_id = environment.environment_id.to_string();
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidConfig {
                message: format!("Organization URL cannot be a base: {}", self.base_url),
            })?
            .pop_if_empty()
            .push(&environment.project)
            .extend(["_apis", "distributedtask", "environments"])
            .push(&environment_id)
            .extend(tail);
        url.query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);
        Ok(url)
    }

    fn kubernetes_url(&self, resource: &ResourceRef) -> ClientResult<Url> {
        let resource_id = resource.resource_id.to_string();
        self.environment_url(
            &resource.environment(),
            &["providers", "kubernetes", resource_id.as_str()],
        )
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
    }

    fn handle_http_error(err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            ClientError::ServiceUnavailable {
                message: "Cannot connect to Azure DevOps".to_string(),
            }
        } else {
            ClientError::Network(err)
        }
    }

    /// Sends the request, retrying throttled, unavailable and unreachable
    /// attempts up to `retry.max_retries` times.
    async fn execute<B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> ClientResult<reqwest::Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .basic_auth("", Some(&self.config.personal_access_token));
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response)
                    if Self::is_retryable_status(response.status())
                        && attempt < retry.max_retries =>
                {
                    warn!(
                        "{} {} returned {}, retrying (attempt {}/{})",
                        method,
                        url.path(),
                        response.status(),
                        attempt + 1,
                        retry.max_retries
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < retry.max_retries => {
                    warn!(
                        "{} {} failed: {}, retrying (attempt {}/{})",
                        method,
                        url.path(),
                        e,
                        attempt + 1,
                        retry.max_retries
                    );
                }
                Err(e) => return Err(Self::handle_http_error(e)),
            }

            attempt += 1;
            tokio::time::sleep(retry.backoff * attempt).await;
        }
    }

    async fn check_status(
        response: reqwest::Response,
        resource: &str,
    ) -> ClientResult<reqwest::Response> {
        let status = response.status();

        // A rejected PAT is answered with a 203 and the sign-in page.
        if status == StatusCode::NON_AUTHORITATIVE_INFORMATION {
            return Err(ClientError::Authentication);
        }
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            404 => ClientError::NotFound {
                resource: resource.to_string(),
            },
            401 | 403 => ClientError::Authentication,
            429 => ClientError::RateLimit,
            503 => ClientError::ServiceUnavailable {
                message: Self::extract_message(&error_text),
            },
            code => ClientError::Api {
                status: code,
                message: Self::extract_message(&error_text),
            },
        })
    }

    fn extract_message(body: &str) -> String {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => match parsed.type_key {
                Some(key) => format!("{} ({})", parsed.message, key),
                None => parsed.message,
            },
            Err(_) => body.to_string(),
        }
    }

    /// Parses a GET body. The service answers a lookup of a missing resource
    /// with `200` and an empty or `null` body.
    async fn parse_found<T: DeserializeOwned>(
        response: reqwest::Response,
        resource: &str,
    ) -> ClientResult<T> {
        let text = response.text().await.map_err(Self::handle_http_error)?;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(ClientError::NotFound {
                resource: resource.to_string(),
            });
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    async fn parse_body<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let text = response.text().await.map_err(Self::handle_http_error)?;
        Ok(serde_json::from_str(text.trim())?)
    }
}

#[async_trait]
impl TaskAgentClient for HttpTaskAgentClient {
    async fn get_kubernetes_resource(
        &self,
        resource: &ResourceRef,
    ) -> ClientResult<KubernetesResource> {
        debug!("Reading Kubernetes resource {}", resource);

        let url = self.kubernetes_url(resource)?;
        let label = resource.to_string();
        let response = self.execute::<()>(Method::GET, url, None).await?;
        let response = Self::check_status(response, &label).await?;
        Self::parse_found(response, &label).await
    }

    async fn add_kubernetes_resource(
        &self,
        environment: &EnvironmentRef,
        params: KubernetesResourceCreateParameters,
    ) -> ClientResult<KubernetesResource> {
        debug!(
            "Adding Kubernetes resource {:?} to environment {}",
            params.name, environment
        );

        let url = self.environment_url(environment, &["providers", "kubernetes"])?;
        let label = format!("environment {}", environment);
        let response = self.execute(Method::POST, url, Some(&params)).await?;
        let response = Self::check_status(response, &label).await?;
        let created: KubernetesResource = Self::parse_body(response).await?;

        info!(
            "Created Kubernetes resource {} in environment {}",
            created.id, environment
        );
        Ok(created)
    }

    async fn update_kubernetes_resource(
        &self,
        resource: &ResourceRef,
        params: KubernetesResourcePatchParameters,
    ) -> ClientResult<KubernetesResource> {
        debug!("Updating Kubernetes resource {}", resource);

        let url = self.kubernetes_url(resource)?;
        let label = resource.to_string();
        let response = self.execute(Method::PATCH, url, Some(&params)).await?;
        let response = Self::check_status(response, &label).await?;
        let updated = Self::parse_body(response).await?;

        info!("Updated Kubernetes resource {}", resource);
        Ok(updated)
    }

    async fn delete_kubernetes_resource(&self, resource: &ResourceRef) -> ClientResult<()> {
        debug!("Deleting Kubernetes resource {}", resource);

        let url = self.kubernetes_url(resource)?;
        let response = self.execute::<()>(Method::DELETE, url, None).await?;
        Self::check_status(response, &resource.to_string()).await?;

        info!("Deleted Kubernetes resource {}", resource);
        Ok(())
    }

    fn client_name(&self) -> &'static str {
        "azure-devops"
    }
}
