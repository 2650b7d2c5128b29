//! # Reconciliation Tests
//!
//! End-to-end reconciliation of `PropertyConfig` resources against in-memory
//! fakes of the Kubernetes API and the git fetcher.

mod common;

use common::{property_config, reconciler, spec, FakeCluster, FakeFetcher, COMMIT, NAMESPACE};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use property_config_controller::controller::reconciler::materialize::MaterializeAction;
use property_config_controller::controller::reconciler::{
    reconcile_resource, ReconcileOutcome, ReconcilerError,
};
use property_config_controller::crd::Condition;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const TEMPLATE: &str = "db.host={{ database.host }}\ndb.port={{ database.port }}\n";

fn condition(cluster: &FakeCluster, name: &str) -> Condition {
    let resource = cluster.resource(NAMESPACE, name).unwrap();
    let status = resource.status.unwrap();
    assert_eq!(status.conditions.len(), 1);
    status.conditions[0].clone()
}

fn data(cluster: &FakeCluster, name: &str) -> BTreeMap<String, String> {
    cluster.config_map(NAMESPACE, name).unwrap().data.unwrap()
}

fn setup(
    resource_spec: property_config_controller::crd::PropertyConfigSpec,
    template: &str,
) -> (Arc<FakeCluster>, Arc<FakeFetcher>) {
    let cluster = Arc::new(FakeCluster::default());
    cluster.insert_resource(property_config("orders", resource_spec));
    let fetcher = Arc::new(FakeFetcher::with_file("config/application.properties", template));
    (cluster, fetcher)
}

#[tokio::test]
async fn test_kvp_creates_config_map_with_provenance() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\nb=2\n");
    let ctx = reconciler(&cluster, &fetcher);

    let outcome = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Materialized {
            config_map: "orders".to_string(),
            commit: COMMIT.to_string(),
            action: MaterializeAction::Created,
        }
    );

    assert_eq!(
        data(&cluster, "orders"),
        BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
            ("commit".to_string(), COMMIT.to_string()),
            (
                "repoUrl".to_string(),
                "https://git.example.com/platform/orders.git".to_string()
            ),
            ("revision".to_string(), "main".to_string()),
            (
                "path".to_string(),
                "config/application.properties".to_string()
            ),
        ])
    );

    let condition = condition(&cluster, "orders");
    assert_eq!(condition.r#type, "ConfigMapCreated");
    assert!(condition.is_true());
    assert_eq!(condition.reason.as_deref(), Some("Created"));
    assert_eq!(condition.observed_generation, Some(1));
}

#[tokio::test]
async fn test_rendered_values_reach_config_map() {
    let (cluster, fetcher) = setup(spec("kvp"), TEMPLATE);
    let ctx = reconciler(&cluster, &fetcher);

    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();

    let data = data(&cluster, "orders");
    assert_eq!(data.get("db.host").map(String::as_str), Some("db.internal"));
    assert_eq!(data.get("db.port").map(String::as_str), Some("5432"));
}

#[tokio::test]
async fn test_second_reconcile_is_idempotent() {
    let (cluster, fetcher) = setup(spec("kvp"), TEMPLATE);
    let ctx = reconciler(&cluster, &fetcher);

    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();
    let first_map = cluster.config_map(NAMESPACE, "orders").unwrap();
    let first_condition = condition(&cluster, "orders");

    let outcome = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Materialized {
            action: MaterializeAction::Updated,
            ..
        }
    ));

    let second_map = cluster.config_map(NAMESPACE, "orders").unwrap();
    assert_eq!(
        serde_json::to_vec(&first_map).unwrap(),
        serde_json::to_vec(&second_map).unwrap()
    );

    let second_condition = condition(&cluster, "orders");
    assert!(second_condition.is_true());
    assert_eq!(second_condition.reason.as_deref(), Some("Updated"));
}

#[tokio::test]
async fn test_repeated_identical_outcome_keeps_transition_time() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\n");
    let ctx = reconciler(&cluster, &fetcher);

    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();
    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();
    let second = condition(&cluster, "orders");
    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();
    let third = condition(&cluster, "orders");

    assert_eq!(second, third);
}

#[tokio::test]
async fn test_template_overrides_provenance_key() {
    let (cluster, fetcher) = setup(spec("kvp"), "commit=deadbeef\n");
    let ctx = reconciler(&cluster, &fetcher);

    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();

    assert_eq!(
        data(&cluster, "orders").get("commit").map(String::as_str),
        Some("deadbeef")
    );
}

#[tokio::test]
async fn test_key_mode_stores_trimmed_text() {
    let mut resource_spec = spec("key");
    resource_spec.key_name = "greeting".to_string();
    let (cluster, fetcher) = setup(resource_spec, "  hello world  \n");
    let ctx = reconciler(&cluster, &fetcher);

    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();

    let data = data(&cluster, "orders");
    assert_eq!(data.get("greeting").map(String::as_str), Some("hello world"));
    // Only the rendered key beyond provenance
    assert_eq!(data.len(), 5);
}

#[tokio::test]
async fn test_key_mode_without_key_name_is_invalid() {
    let (cluster, fetcher) = setup(spec("key"), "hello\n");
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert!(matches!(err, ReconcilerError::FormatInvalid(_)));
    assert!(err.is_permanent());
    assert_eq!(cluster.config_map_writes.load(Ordering::SeqCst), 0);

    let condition = condition(&cluster, "orders");
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason.as_deref(), Some("FormatInvalid"));
}

#[tokio::test]
async fn test_malformed_kvp_line_is_invalid() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\nnoequalsign\n");
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert_eq!(err.reason(), "FormatInvalid");
    assert!(err.to_string().contains("line 2"));
    assert_eq!(cluster.config_map_count(), 0);
    assert_eq!(cluster.config_map_writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_property_type_skips_fetch_and_write() {
    let (cluster, fetcher) = setup(spec("xml"), "a=1\n");
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert!(matches!(err, ReconcilerError::FormatInvalid(_)));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(cluster.config_map_writes.load(Ordering::SeqCst), 0);

    let condition = condition(&cluster, "orders");
    assert_eq!(condition.reason.as_deref(), Some("FormatInvalid"));
    assert!(condition.message.unwrap().contains("xml"));
}

#[tokio::test]
async fn test_unknown_property_type_leaves_existing_config_map_alone() {
    let (cluster, fetcher) = setup(spec("xml"), "a=1\n");
    let existing = ConfigMap {
        metadata: ObjectMeta {
            name: Some("orders".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([("keep".to_string(), "me".to_string())])),
        ..ConfigMap::default()
    };
    cluster.insert_config_map(existing.clone());
    let ctx = reconciler(&cluster, &fetcher);

    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();

    assert_eq!(cluster.config_map(NAMESPACE, "orders"), Some(existing));
}

#[tokio::test]
async fn test_missing_properties_file_reports_commit() {
    let mut resource_spec = spec("kvp");
    resource_spec.properties_path = "config/missing.properties".to_string();
    let (cluster, fetcher) = setup(resource_spec, "a=1\n");
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert!(matches!(err, ReconcilerError::FetchFailed(_)));
    assert!(!err.is_permanent());

    let condition = condition(&cluster, "orders");
    assert_eq!(condition.reason.as_deref(), Some("FetchFailed"));
    assert!(condition.message.unwrap().contains(COMMIT));
}

#[tokio::test]
async fn test_clone_failure_is_fetch_failed() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\n");
    fetcher.fail_clone.store(true, Ordering::SeqCst);
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert_eq!(err.reason(), "FetchFailed");
    assert_eq!(cluster.config_map_count(), 0);
}

#[tokio::test]
async fn test_undefined_template_variable_is_render_failed() {
    let (cluster, fetcher) = setup(spec("kvp"), "x={{ nowhere.defined }}\n");
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert!(matches!(err, ReconcilerError::RenderFailed(_)));
    assert_eq!(condition(&cluster, "orders").reason.as_deref(), Some("RenderFailed"));
    assert_eq!(cluster.config_map_count(), 0);
}

#[tokio::test]
async fn test_invalid_source_config_is_render_failed() {
    let mut resource_spec = spec("kvp");
    resource_spec.source_config = "database: [unterminated".to_string();
    let (cluster, fetcher) = setup(resource_spec, TEMPLATE);
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert_eq!(err.reason(), "RenderFailed");
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_deleted_resource_is_a_no_op() {
    let cluster = Arc::new(FakeCluster::default());
    let fetcher = Arc::new(FakeFetcher::default());
    let ctx = reconciler(&cluster, &fetcher);

    let outcome = reconcile_resource(&ctx, NAMESPACE, "gone").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Deleted);
    assert_eq!(cluster.status_writes.load(Ordering::SeqCst), 0);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_config_map_write_failure_is_create_failed() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\n");
    cluster.fail_config_map_writes.store(true, Ordering::SeqCst);
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert_eq!(err.reason(), "CreateFailed");
    assert!(!err.is_permanent());
    assert_eq!(condition(&cluster, "orders").reason.as_deref(), Some("CreateFailed"));
}

#[tokio::test]
async fn test_config_map_read_failure_is_create_failed_without_writes() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\n");
    cluster.fail_config_map_reads.store(true, Ordering::SeqCst);
    let ctx = reconciler(&cluster, &fetcher);

    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert_eq!(err.reason(), "CreateFailed");
    assert!(!err.is_permanent());
    assert_eq!(cluster.config_map_writes.load(Ordering::SeqCst), 0);
    assert_eq!(cluster.config_map_count(), 0);

    let condition = condition(&cluster, "orders");
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason.as_deref(), Some("CreateFailed"));
    assert!(condition.message.as_deref().unwrap_or_default().contains("forbidden"));
}

#[tokio::test]
async fn test_replace_failure_is_update_failed() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\n");
    let ctx = reconciler(&cluster, &fetcher);
    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();

    cluster.fail_config_map_writes.store(true, Ordering::SeqCst);
    let err = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap_err();
    assert_eq!(err.reason(), "UpdateFailed");
}

#[tokio::test]
async fn test_out_of_band_edits_are_overwritten() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\n");
    let ctx = reconciler(&cluster, &fetcher);
    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();

    let mut edited = cluster.config_map(NAMESPACE, "orders").unwrap();
    edited
        .data
        .as_mut()
        .unwrap()
        .insert("manual".to_string(), "edit".to_string());
    cluster.insert_config_map(edited);

    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();
    assert!(!data(&cluster, "orders").contains_key("manual"));
}

#[tokio::test]
async fn test_status_write_failure_does_not_fail_reconcile() {
    let (cluster, fetcher) = setup(spec("kvp"), "a=1\n");
    cluster.fail_status_writes.store(true, Ordering::SeqCst);
    let ctx = reconciler(&cluster, &fetcher);

    let outcome = reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Materialized { .. }));
    assert_eq!(cluster.status_writes.load(Ordering::SeqCst), 1);
    assert!(cluster.config_map(NAMESPACE, "orders").is_some());
}

#[tokio::test]
async fn test_artifact_name_and_owner() {
    let mut resource_spec = spec("kvp");
    resource_spec.artifact_name = "orders-properties".to_string();
    let (cluster, fetcher) = setup(resource_spec, "a=1\n");
    let ctx = reconciler(&cluster, &fetcher);

    reconcile_resource(&ctx, NAMESPACE, "orders").await.unwrap();

    assert!(cluster.config_map(NAMESPACE, "orders").is_none());
    let config_map = cluster.config_map(NAMESPACE, "orders-properties").unwrap();
    let owners = config_map.metadata.owner_references.unwrap();
    assert_eq!(owners[0].uid, "uid-orders");
    assert_eq!(owners[0].kind, "PropertyConfig");
    assert_eq!(
        config_map
            .metadata
            .labels
            .unwrap()
            .get("created-by")
            .map(String::as_str),
        Some("property-config-controller")
    );
}
