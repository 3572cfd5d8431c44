//! Exercises the host→tenant override path (consumer.rs step 4) against
//! the bundled example config files, the way an operator's deployment
//! would load them.

use nubla_ingest::host_tenant_map::HostTenantMap;
use nubla_ingest::tenant_registry::TenantRegistry;
use std::path::Path;

fn manifest_path(rel: &str) -> String {
    format!("{}/{}", env!("CARGO_MANIFEST_DIR"), rel)
}

#[test]
fn bundled_tenants_file_loads_and_validates() {
    let registry = TenantRegistry::new(manifest_path("config/tenants.json"));
    assert!(registry.is_valid("acme"));
    assert!(registry.is_valid("globex"));
    assert!(registry.is_valid("default"));
    assert!(!registry.is_valid("unknown-tenant"));
}

#[test]
fn bundled_host_map_resolves_known_hosts() {
    let map = HostTenantMap::load(Path::new(&manifest_path("config/host_tenant_map.json")));
    assert_eq!(map.lookup("fw-acme-01"), Some("acme"));
    assert_eq!(map.lookup("FW-ACME-01"), Some("acme"));
    assert_eq!(map.lookup("fw-globex-dc1"), Some("globex"));
    assert_eq!(map.lookup("unregistered-host"), None);
}
