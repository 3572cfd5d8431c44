//! Metrics Exporter (spec.md §4.J).
//!
//! Prometheus text exposition via `metrics-exporter-prometheus`'s builtin
//! HTTP listener. Counters/histograms/gauges are emitted inline at their
//! call sites through the `metrics` crate's `counter!`/`histogram!`/
//! `gauge!` macros (consumer.rs, bulk_indexer.rs, search_client.rs);
//! this module only owns process startup and the two gauges
//! (`tenant_registry_size`) that don't belong to any single request.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Installs the global Prometheus recorder and binds its HTTP listener on
/// `METRICS_PORT`. Must be called exactly once per process, before any
/// `metrics::*!` call site is reached.
pub fn install(port: u16) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(port, "metrics_exporter_installed");
    Ok(())
}

pub fn set_tenant_registry_size(size: usize) {
    metrics::gauge!("tenant_registry_size").set(size as f64);
}
