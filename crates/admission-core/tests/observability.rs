//! Observability tests for admission decisions.
//!
//! Each test drives an engine or an emit function under `#[traced_test]`
//! and checks the structured event it leaves behind.

use admission_core::obs::{
    emit_fetch_failed, emit_patches_generated, emit_region_populated, emit_upgrade_decided,
    RequestSpan,
};
use admission_core::{diff_values, CallContext, ReleaseUpgradeValidator, SemanticVersion};
use admission_core::{metrics::METRICS, VmCapabilities};
use admission_state::fakes::{MemoryObjectStore, StubCapabilitySource};
use admission_state::ResourceSku;
use serde_json::json;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn emit_functions_log_event_names() {
    emit_upgrade_decided("11.3.0", "12.0.0", false, "release-skipped");
    emit_region_populated("westeurope", 42);
    emit_patches_generated(3, Some("/spec/networkSpec"));
    emit_fetch_failed("westeurope", &"throttled");

    assert!(logs_contain("upgrade.decided"));
    assert!(logs_contain("vmcaps.region_populated"));
    assert!(logs_contain("patch.generated"));
    assert!(logs_contain("vmcaps.fetch_failed"));
}

#[traced_test]
#[test]
fn request_span_wraps_events() {
    let span = RequestSpan::enter("uid-42", "AzureMachinePool");
    emit_patches_generated(0, None);
    drop(span);
    assert!(logs_contain("uid-42"));
}

#[traced_test]
#[tokio::test]
async fn upgrade_validation_emits_decision() {
    let validator = ReleaseUpgradeValidator::new(MemoryObjectStore::with_releases([
        "v11.3.0", "v11.4.0", "v12.0.0",
    ]));
    let decision = validator
        .validate(
            &CallContext::new(),
            &SemanticVersion::new(11, 3, 0),
            &SemanticVersion::new(12, 0, 0),
        )
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert!(logs_contain("release-skipped"));
}

#[traced_test]
#[tokio::test]
async fn region_population_and_failures_are_logged() {
    let source = StubCapabilitySource::new().with_region(
        "westeurope",
        vec![ResourceSku::new("Standard_D4s_v3").with_capability("vCPUs", "4")],
    );
    let caps = VmCapabilities::new(source);
    let ctx = CallContext::new();

    caps.cpus(&ctx, "westeurope", "Standard_D4s_v3").await.unwrap();
    assert!(logs_contain("vmcaps.region_populated"));

    caps.source().fail_with("throttled");
    caps.cpus(&ctx, "northeurope", "Standard_D4s_v3")
        .await
        .unwrap_err();
    assert!(logs_contain("vmcaps.fetch_failed"));
    assert!(logs_contain("throttled"));
}

#[traced_test]
#[test]
fn metrics_flush_reports_counters() {
    diff_values(&json!({"a": 1}), &json!({"a": 2, "b": 3}));
    assert!(METRICS.patch_ops_emitted() >= 2);
    METRICS.flush();
    assert!(logs_contain("patch_ops_emitted"));
}
