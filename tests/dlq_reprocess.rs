//! Scenario 6 (spec.md §8): a DLQ body with a null severity gets a default
//! severity, the `dlq_reprocess` flag, and remains scoped to its tenant.

use nubla_ingest::dlq_reprocessor::{plan_reprocess, ReprocessPlan};
use nubla_ingest::tenant_registry::TenantRegistry;

#[test]
fn reprocessed_event_is_still_valid_for_its_known_tenant() {
    let registry = TenantRegistry::new(format!(
        "{}/config/tenants.json",
        env!("CARGO_MANIFEST_DIR")
    ));

    let body = br#"{"tenant_id":"acme","message":"x","severity":null}"#;
    let plan = plan_reprocess(body, "info");

    let ReprocessPlan::Republish(value) = plan else {
        panic!("expected a republish plan");
    };
    assert_eq!(value["severity"], "info");
    assert_eq!(value["dlq_reprocess"], true);
    assert!(registry.is_valid(value["tenant_id"].as_str().unwrap()));
}

#[test]
fn reprocessed_event_for_unknown_tenant_still_fails_registry_check() {
    let registry = TenantRegistry::new(format!(
        "{}/config/tenants.json",
        env!("CARGO_MANIFEST_DIR")
    ));

    let body = br#"{"tenant_id":"ghost","message":"hi","severity":null}"#;
    let plan = plan_reprocess(body, "info");

    let ReprocessPlan::Republish(value) = plan else {
        panic!("expected a republish plan");
    };
    assert!(!registry.is_valid(value["tenant_id"].as_str().unwrap()));
}
