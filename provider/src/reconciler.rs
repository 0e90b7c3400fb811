use crate::config::ResourceConfig;
use crate::error::{ReconcileError, ReconcileResult, ValidationError};
use crate::schema::{self, Plan};
use crate::state::ResourceState;
use azdo::{
    EnvironmentRef, KubernetesResourceCreateParameters, KubernetesResourcePatchParameters,
    ResourceRef, TaskAgentClient,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Found(ResourceState),
    NotFound,
}

impl ReadOutcome {
    pub fn into_option(self) -> Option<ResourceState> {
        match self {
            ReadOutcome::Found(state) => Some(state),
            ReadOutcome::NotFound => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub plan: Plan,
    pub state: ResourceState,
}

/// Create/read/update/delete for `azuredevops_environment_resource_kubernetes`.
///
/// Every call goes to the remote API; nothing is cached between calls and
/// nothing is retried here.
#[derive(Clone)]
pub struct KubernetesResourceReconciler {
    client: Arc<dyn TaskAgentClient>,
}

impl KubernetesResourceReconciler {
    pub fn new(client: Arc<dyn TaskAgentClient>) -> Self {
        Self { client }
    }

    pub async fn create(&self, config: &ResourceConfig) -> ReconcileResult<ResourceState> {
        config.validate()?;

        let environment = EnvironmentRef::new(config.project_id.clone(), config.environment_id);
        let mut params =
            KubernetesResourceCreateParameters::new(config.name.clone(), config.service_endpoint_id)
                .with_tags(config.normalized_tags());
        if let Some(namespace) = &config.namespace {
            params = params.with_namespace(namespace.clone());
        }
        if let Some(cluster_name) = &config.cluster_name {
            params = params.with_cluster_name(cluster_name.clone());
        }

        debug!("Creating Kubernetes resource {:?} in {}", config.name, environment);
        let created = self
            .client
            .add_kubernetes_resource(&environment, params)
            .await?;

        let state =
            ResourceState::from_remote(config.project_id.clone(), config.environment_id, created);
        info!("Created Kubernetes resource {}", state.resource_ref());
        Ok(state)
    }

    pub async fn read(&self, resource: &ResourceRef) -> ReconcileResult<ReadOutcome> {
        match self.client.get_kubernetes_resource(resource).await {
            Ok(remote) => Ok(ReadOutcome::Found(ResourceState::from_remote(
                resource.project.clone(),
                resource.environment_id,
                remote,
            ))),
            Err(err) if err.is_not_found() => {
                debug!("Kubernetes resource {} no longer exists", resource);
                Ok(ReadOutcome::NotFound)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies mutable-field changes. Immutable changes are refused; use
    /// [`Self::apply`] to get replacement semantics.
    pub async fn update(
        &self,
        current: &ResourceState,
        desired: &ResourceConfig,
    ) -> ReconcileResult<ResourceState> {
        desired.validate()?;

        let changed = schema::diff(current, desired);
        if let Some(field) = changed.iter().copied().find(|f| schema::is_force_new(f)) {
            return Err(ValidationError::ImmutableField { field }.into());
        }

        let resource = current.resource_ref();
        if changed.is_empty() {
            debug!("No changes for Kubernetes resource {}", resource);
            return match self.read(&resource).await? {
                ReadOutcome::Found(state) => Ok(state),
                ReadOutcome::NotFound => Err(ReconcileError::NotFound { resource }),
            };
        }

        let patch = KubernetesResourcePatchParameters {
            name: changed.contains(&"name").then(|| desired.name.clone()),
            tags: changed
                .contains(&"tags")
                .then(|| desired.normalized_tags()),
        };

        let updated = self
            .client
            .update_kubernetes_resource(&resource, patch)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    ReconcileError::NotFound {
                        resource: resource.clone(),
                    }
                } else {
                    err.into()
                }
            })?;

        info!(
            "Updated Kubernetes resource {} ({})",
            resource,
            changed.join(", ")
        );
        Ok(ResourceState::from_remote(
            resource.project.clone(),
            resource.environment_id,
            updated,
        ))
    }

    /// Deletes the resource. A resource that is already gone counts as deleted.
    pub async fn delete(&self, resource: &ResourceRef) -> ReconcileResult<()> {
        match self.client.delete_kubernetes_resource(resource).await {
            Ok(()) => {
                info!("Deleted Kubernetes resource {}", resource);
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                warn!("Kubernetes resource {} was already deleted", resource);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Imports an existing resource from `<project>/<environment_id>/<resource_id>`.
    pub async fn import(&self, import_id: &str) -> ReconcileResult<ResourceState> {
        let resource = parse_import_id(import_id)?;
        match self.read(&resource).await? {
            ReadOutcome::Found(state) => {
                info!("Imported Kubernetes resource {}", resource);
                Ok(state)
            }
            ReadOutcome::NotFound => Err(ReconcileError::NotFound { resource }),
        }
    }

    /// Reconciles `prior` towards `desired`, replacing the resource when an
    /// immutable attribute changed.
    ///
    /// `prior` is refreshed from the API before planning: remote drift is
    /// corrected and a resource deleted outside of this tool is created again.
    pub async fn apply(
        &self,
        prior: Option<&ResourceState>,
        desired: &ResourceConfig,
    ) -> ReconcileResult<ApplyOutcome> {
        desired.validate()?;

        let current = match prior {
            Some(prior) => self.refresh(prior).await?,
            None => None,
        };
        let prior = current.as_ref();

        let plan = schema::plan(prior, desired);
        let state = match (&plan, prior) {
            (Plan::Create, _) | (_, None) => self.create(desired).await?,
            (Plan::NoOp, Some(prior)) | (Plan::UpdateInPlace { .. }, Some(prior)) => {
                self.update(prior, desired).await?
            }
            (Plan::Replace { reasons }, Some(prior)) => {
                info!(
                    "Replacing Kubernetes resource {} because {} changed",
                    prior.resource_ref(),
                    reasons.join(", ")
                );
                self.delete(&prior.resource_ref()).await?;
                self.create(desired).await?
            }
        };

        Ok(ApplyOutcome { plan, state })
    }

    async fn refresh(&self, recorded: &ResourceState) -> ReconcileResult<Option<ResourceState>> {
        let resource = recorded.resource_ref();
        match self.read(&resource).await? {
            ReadOutcome::Found(current) => {
                if &current != recorded {
                    warn!("Kubernetes resource {} drifted from the recorded state", resource);
                }
                Ok(Some(current))
            }
            ReadOutcome::NotFound => {
                warn!(
                    "Kubernetes resource {} was deleted outside of this tool; it will be created again",
                    resource
                );
                Ok(None)
            }
        }
    }
}

pub fn parse_import_id(import_id: &str) -> Result<ResourceRef, ValidationError> {
    let invalid = || ValidationError::InvalidImportId {
        id: import_id.to_string(),
    };

    let mut parts = import_id.rsplitn(3, '/');
    let resource_id = parts.next().and_then(|p| p.parse::<i32>().ok());
    let environment_id = parts.next().and_then(|p| p.parse::<i32>().ok());
    let project = parts.next().filter(|p| !p.trim().is_empty());

    match (project, environment_id, resource_id) {
        (Some(project), Some(environment_id), Some(resource_id)) => {
            Ok(ResourceRef::new(project, environment_id, resource_id))
        }
        _ => Err(invalid()),
    }
}
