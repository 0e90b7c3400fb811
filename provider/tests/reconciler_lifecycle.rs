use azdo::{InMemoryTaskAgentClient, TaskAgentClient};
use provider::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

const PROJECT: &str = "lifecycle-project";
const ENVIRONMENT: i32 = 11;

fn endpoint() -> Uuid {
    Uuid::from_u128(0xfeed)
}

fn context() -> (Arc<InMemoryTaskAgentClient>, ProviderContext) {
    let backend = Arc::new(
        InMemoryTaskAgentClient::new()
            .with_environment(PROJECT, ENVIRONMENT)
            .with_service_endpoint(PROJECT, endpoint()),
    );
    let context = ProviderContext::new(backend.clone() as Arc<dyn TaskAgentClient>);
    (backend, context)
}

fn config(name: &str) -> ResourceConfig {
    ResourceConfig::new(PROJECT, ENVIRONMENT, endpoint(), name)
}

#[tokio::test]
async fn test_create_update_delete_scenario() {
    let (_backend, context) = context();
    let reconciler = context.reconciler();
    let address = format!("{}.kubernetes", RESOURCE_TYPE);
    let mut snapshot = StateSnapshot::new();

    let created = reconciler.create(&config("env-res-A")).await.unwrap();
    snapshot.set(address.clone(), &created);
    verify_exists(context.client(), &snapshot, &address, "env-res-A")
        .await
        .unwrap();

    let prior = snapshot.state(&address).unwrap().unwrap();
    let updated = reconciler
        .update(&prior, &config("env-res-B"))
        .await
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.project_id, created.project_id);
    assert_eq!(updated.environment_id, created.environment_id);
    assert_eq!(updated.service_endpoint_id, created.service_endpoint_id);
    snapshot.set(address.clone(), &updated);
    verify_exists(context.client(), &snapshot, &address, "env-res-B")
        .await
        .unwrap();

    reconciler.delete(&updated.resource_ref()).await.unwrap();
    assert_eq!(
        reconciler.read(&updated.resource_ref()).await.unwrap(),
        ReadOutcome::NotFound
    );
    verify_all_destroyed(context.client(), &snapshot)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_drift_is_detected_on_read() {
    let (backend, context) = context();
    let reconciler = context.reconciler();
    let created = reconciler.create(&config("env-res-A")).await.unwrap();

    // someone renames the resource outside of our control
    backend
        .update_kubernetes_resource(
            &created.resource_ref(),
            azdo::KubernetesResourcePatchParameters {
                name: Some("renamed-by-hand".to_string()),
                tags: None,
            },
        )
        .await
        .unwrap();

    let refreshed = reconciler
        .read(&created.resource_ref())
        .await
        .unwrap()
        .into_option()
        .unwrap();
    assert_eq!(refreshed.name, "renamed-by-hand");
    assert_eq!(
        provider::schema::plan(Some(&refreshed), &config("env-res-A")),
        Plan::UpdateInPlace {
            changed: vec!["name"]
        }
    );
}

#[tokio::test]
async fn test_apply_restores_name_changed_outside() {
    let (backend, context) = context();
    let reconciler = context.reconciler();
    let first = reconciler.apply(None, &config("env-res-A")).await.unwrap();

    backend
        .update_kubernetes_resource(
            &first.state.resource_ref(),
            azdo::KubernetesResourcePatchParameters {
                name: Some("by-hand".to_string()),
                tags: None,
            },
        )
        .await
        .unwrap();

    // the recorded state still says env-res-A; only the remote copy drifted
    let second = reconciler
        .apply(Some(&first.state), &config("env-res-A"))
        .await
        .unwrap();
    assert_eq!(
        second.plan,
        Plan::UpdateInPlace {
            changed: vec!["name"]
        }
    );
    assert_eq!(second.state.id, first.state.id);
    assert_eq!(second.state.name, "env-res-A");

    let remote = reconciler
        .read(&first.state.resource_ref())
        .await
        .unwrap()
        .into_option()
        .unwrap();
    assert_eq!(remote.name, "env-res-A");
}

#[tokio::test]
async fn test_apply_recreates_resource_deleted_outside() {
    let (backend, context) = context();
    let reconciler = context.reconciler();
    let first = reconciler.apply(None, &config("env-res-A")).await.unwrap();

    backend
        .delete_kubernetes_resource(&first.state.resource_ref())
        .await
        .unwrap();

    let second = reconciler
        .apply(Some(&first.state), &config("env-res-A"))
        .await
        .unwrap();
    assert_eq!(second.plan, Plan::Create);
    assert_ne!(second.state.id, first.state.id);
    assert_eq!(second.state.name, "env-res-A");
    assert_eq!(backend.resource_count(), 1);

    let mut snapshot = StateSnapshot::new();
    snapshot.set(format!("{}.kubernetes", RESOURCE_TYPE), &second.state);
    verify_exists(
        context.client(),
        &snapshot,
        &format!("{}.kubernetes", RESOURCE_TYPE),
        "env-res-A",
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_apply_is_a_no_op_without_drift() {
    let (backend, context) = context();
    let reconciler = context.reconciler();
    let first = reconciler
        .apply(None, &config("env-res-A").with_tags(["b", "a"]))
        .await
        .unwrap();

    let second = reconciler
        .apply(Some(&first.state), &config("env-res-A").with_tags(["a", "b"]))
        .await
        .unwrap();
    assert_eq!(second.plan, Plan::NoOp);
    assert_eq!(second.state, first.state);
    assert_eq!(backend.resource_count(), 1);
}

#[tokio::test]
async fn test_parallel_lifecycles_share_one_client() {
    let (backend, context) = context();

    let runs = (0..8).map(|i| {
        let context = context.clone();
        async move {
            let reconciler = context.reconciler();
            let created = reconciler
                .create(&config(&format!("parallel-{}", i)))
                .await?;
            let renamed = reconciler
                .update(&created, &config(&format!("parallel-{}-renamed", i)))
                .await?;
            reconciler.delete(&renamed.resource_ref()).await?;
            let after = reconciler.read(&renamed.resource_ref()).await?;
            Ok::<_, ReconcileError>((created.id, renamed.id, after))
        }
    });

    let results = futures::future::join_all(runs).await;
    let mut ids = Vec::new();
    for result in results {
        let (created, renamed, after) = result.unwrap();
        assert_eq!(created, renamed);
        assert_eq!(after, ReadOutcome::NotFound);
        ids.push(created);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(backend.resource_count(), 0);
}

#[tokio::test]
async fn test_failed_create_leaves_no_state() {
    let (backend, context) = context();
    let mut snapshot = StateSnapshot::new();
    let mut desired = config("env-res-A");
    desired.environment_id = 12345;

    let result = context.reconciler().apply(None, &desired).await;
    if let Ok(outcome) = &result {
        snapshot.set("azuredevops_environment_resource_kubernetes.kubernetes", &outcome.state);
    }

    assert!(matches!(result, Err(ReconcileError::Remote(_))));
    assert!(snapshot.is_empty());
    assert_eq!(backend.resource_count(), 0);
}
