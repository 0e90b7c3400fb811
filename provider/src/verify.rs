//! Checks that compare a state snapshot against the remote API.
//!
//! The snapshot only tells us *which* resources to look at. Whether they
//! exist, and what they look like, is always decided by a fresh request.

use crate::state::{ResourceState, StateError, StateSnapshot, RESOURCE_TYPE};
use azdo::{ClientError, KubernetesResource, ResourceRef, TaskAgentClient};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Did not find {address} in the state")]
    NotInState { address: String },

    #[error("Resource {address} has an invalid state: {source}")]
    InvalidState {
        address: String,
        #[source]
        source: StateError,
    },

    #[error("Resource with ID={id} cannot be found")]
    NotFound { id: i32 },

    #[error("Resource with ID={id} has Name={actual}, but expected Name={expected}")]
    Mismatch {
        id: i32,
        actual: String,
        expected: String,
    },

    #[error("Resource ID {id} should not exist")]
    StillExists { id: i32 },

    #[error("Resource with ID={id} could not be read: {source}")]
    Remote {
        id: i32,
        #[source]
        source: ClientError,
    },
}

pub type VerifyResult<T> = Result<T, VerifyError>;

/// How long to keep reading a deleted resource before declaring it alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyPoll {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for DestroyPoll {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(2),
        }
    }
}

async fn read_remote(
    client: &dyn TaskAgentClient,
    resource: &ResourceRef,
) -> VerifyResult<Option<KubernetesResource>> {
    match client.get_kubernetes_resource(resource).await {
        Ok(found) => Ok(Some(found)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(source) => Err(VerifyError::Remote {
            id: resource.resource_id,
            source,
        }),
    }
}

fn state_at(snapshot: &StateSnapshot, address: &str) -> VerifyResult<ResourceState> {
    snapshot
        .state(address)
        .map_err(|source| VerifyError::InvalidState {
            address: address.to_string(),
            source,
        })?
        .ok_or_else(|| VerifyError::NotInState {
            address: address.to_string(),
        })
}

/// Checks that the resource at `address` exists remotely and is named
/// `expected_name`.
pub async fn verify_exists(
    client: &dyn TaskAgentClient,
    snapshot: &StateSnapshot,
    address: &str,
    expected_name: &str,
) -> VerifyResult<KubernetesResource> {
    let state = state_at(snapshot, address)?;
    let resource = state.resource_ref();

    let remote = read_remote(client, &resource)
        .await?
        .ok_or(VerifyError::NotFound { id: state.id })?;

    if remote.name != expected_name {
        return Err(VerifyError::Mismatch {
            id: state.id,
            actual: remote.name,
            expected: expected_name.to_string(),
        });
    }

    debug!("Verified {} exists as {:?}", resource, expected_name);
    Ok(remote)
}

/// Checks that no Kubernetes resource recorded in `snapshot` can still be
/// read. Each resource is read exactly once.
pub async fn verify_all_destroyed(
    client: &dyn TaskAgentClient,
    snapshot: &StateSnapshot,
) -> VerifyResult<()> {
    for (address, _) in snapshot.of_type(RESOURCE_TYPE) {
        let state = state_at(snapshot, address)?;
        if read_remote(client, &state.resource_ref()).await?.is_some() {
            return Err(VerifyError::StillExists { id: state.id });
        }
    }
    Ok(())
}

/// Like [`verify_all_destroyed`], but tolerates a backend that keeps serving
/// deleted resources for a while.
pub async fn verify_all_destroyed_with_poll(
    client: &dyn TaskAgentClient,
    snapshot: &StateSnapshot,
    poll: DestroyPoll,
) -> VerifyResult<()> {
    for (address, _) in snapshot.of_type(RESOURCE_TYPE) {
        let state = state_at(snapshot, address)?;
        wait_until_destroyed(client, &state.resource_ref(), poll).await?;
    }
    Ok(())
}

/// Reads `resource` until it is gone or `poll.timeout` elapses.
pub async fn wait_until_destroyed(
    client: &dyn TaskAgentClient,
    resource: &ResourceRef,
    poll: DestroyPoll,
) -> VerifyResult<()> {
    let start = Instant::now();

    loop {
        if read_remote(client, resource).await?.is_none() {
            debug!("{} is gone after {:?}", resource, start.elapsed());
            return Ok(());
        }

        if start.elapsed() >= poll.timeout {
            warn!(
                "{} is still readable {:?} after deletion",
                resource,
                start.elapsed()
            );
            return Err(VerifyError::StillExists {
                id: resource.resource_id,
            });
        }

        tokio::time::sleep(poll.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::reconciler::KubernetesResourceReconciler;
    use azdo::InMemoryTaskAgentClient;
    use std::sync::Arc;
    use uuid::Uuid;

    const PROJECT: &str = "proj";
    const ENVIRONMENT: i32 = 3;

    fn address(name: &str) -> String {
        format!("{}.{}", RESOURCE_TYPE, name)
    }

    fn setup(lag: usize) -> (Arc<InMemoryTaskAgentClient>, KubernetesResourceReconciler) {
        let backend = Arc::new(
            InMemoryTaskAgentClient::new()
                .with_environment(PROJECT, ENVIRONMENT)
                .with_service_endpoint(PROJECT, Uuid::from_u128(1))
                .with_delete_lag(lag),
        );
        let reconciler = KubernetesResourceReconciler::new(backend.clone());
        (backend, reconciler)
    }

    fn config(name: &str) -> ResourceConfig {
        ResourceConfig::new(PROJECT, ENVIRONMENT, Uuid::from_u128(1), name)
    }

    fn fast_poll() -> DestroyPoll {
        DestroyPoll {
            timeout: Duration::from_millis(200),
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_verify_exists() {
        let (backend, reconciler) = setup(0);
        let state = reconciler.create(&config("env-res-A")).await.unwrap();
        let mut snapshot = StateSnapshot::new();
        snapshot.set(address("kubernetes"), &state);

        let remote = verify_exists(backend.as_ref(), &snapshot, &address("kubernetes"), "env-res-A")
            .await
            .unwrap();
        assert_eq!(remote.id, state.id);

        let err = verify_exists(backend.as_ref(), &snapshot, &address("kubernetes"), "env-res-B")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "Resource with ID={} has Name=env-res-A, but expected Name=env-res-B",
                state.id
            )
        );

        let err = verify_exists(backend.as_ref(), &snapshot, &address("other"), "env-res-A")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::NotInState { .. }));
    }

    #[tokio::test]
    async fn test_verify_exists_rereads_remote() {
        let (backend, reconciler) = setup(0);
        let state = reconciler.create(&config("env-res-A")).await.unwrap();
        let mut snapshot = StateSnapshot::new();
        snapshot.set(address("kubernetes"), &state);

        reconciler.delete(&state.resource_ref()).await.unwrap();

        let err = verify_exists(backend.as_ref(), &snapshot, &address("kubernetes"), "env-res-A")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::NotFound { id } if id == state.id));
    }

    #[tokio::test]
    async fn test_verify_exists_rejects_corrupt_state() {
        let (backend, reconciler) = setup(0);
        let state = reconciler.create(&config("env-res-A")).await.unwrap();
        let mut snapshot = StateSnapshot::new();
        snapshot.set(address("kubernetes"), &state);
        snapshot
            .resources
            .get_mut(&address("kubernetes"))
            .unwrap()
            .primary
            .id = "abc".to_string();

        let err = verify_exists(backend.as_ref(), &snapshot, &address("kubernetes"), "env-res-A")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_all_destroyed() {
        let (backend, reconciler) = setup(0);
        let mut snapshot = StateSnapshot::new();
        for i in 0..4 {
            let state = reconciler
                .create(&config(&format!("res-{}", i)))
                .await
                .unwrap();
            snapshot.set(address(&format!("r{}", i)), &state);
            reconciler.delete(&state.resource_ref()).await.unwrap();
        }

        verify_all_destroyed(backend.as_ref(), &snapshot)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_survivor_is_reported() {
        let (backend, reconciler) = setup(0);
        let mut snapshot = StateSnapshot::new();
        let mut survivor = None;
        for i in 0..3 {
            let state = reconciler
                .create(&config(&format!("res-{}", i)))
                .await
                .unwrap();
            snapshot.set(address(&format!("r{}", i)), &state);
            if i == 1 {
                survivor = Some(state.id);
            } else {
                reconciler.delete(&state.resource_ref()).await.unwrap();
            }
        }

        let err = verify_all_destroyed(backend.as_ref(), &snapshot)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::StillExists { id } if Some(id) == survivor));
    }

    #[tokio::test]
    async fn test_other_resource_types_are_ignored() {
        let (backend, _) = setup(0);
        let mut snapshot = StateSnapshot::new();
        snapshot.resources.insert(
            "azuredevops_project.project".to_string(),
            crate::state::ResourceInstance {
                resource_type: "azuredevops_project".to_string(),
                primary: crate::state::InstanceState {
                    id: "not-a-number".to_string(),
                    attributes: Default::default(),
                },
            },
        );

        verify_all_destroyed(backend.as_ref(), &snapshot)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_failure_is_not_destroyed() {
        let (backend, reconciler) = setup(0);
        let state = reconciler.create(&config("env-res-A")).await.unwrap();
        let mut snapshot = StateSnapshot::new();
        snapshot.set(address("kubernetes"), &state);
        reconciler.delete(&state.resource_ref()).await.unwrap();
        backend.set_unavailable(true);

        let err = verify_all_destroyed(backend.as_ref(), &snapshot)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Remote { id, .. } if id == state.id));
    }

    #[tokio::test]
    async fn test_lagging_delete() {
        let (backend, reconciler) = setup(3);
        let state = reconciler.create(&config("env-res-A")).await.unwrap();
        let mut snapshot = StateSnapshot::new();
        snapshot.set(address("kubernetes"), &state);
        reconciler.delete(&state.resource_ref()).await.unwrap();

        // a single read still sees the resource
        assert!(matches!(
            verify_all_destroyed(backend.as_ref(), &snapshot).await,
            Err(VerifyError::StillExists { .. })
        ));

        verify_all_destroyed_with_poll(backend.as_ref(), &snapshot, fast_poll())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_until_destroyed_times_out() {
        let (backend, reconciler) = setup(0);
        let state = reconciler.create(&config("env-res-A")).await.unwrap();

        let err = wait_until_destroyed(backend.as_ref(), &state.resource_ref(), fast_poll())
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::StillExists { id } if id == state.id));
    }
}
