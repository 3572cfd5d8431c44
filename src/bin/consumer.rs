//! Ingestion consumer process entry point.
//!
//! Wires environment configuration, the tenant registry, schema validator,
//! search client, broker topology and consume loop together, and exits
//! cleanly on SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use lapin::{Connection, ConnectionProperties};
use nubla_ingest::broker::consumer::Consumer;
use nubla_ingest::broker::topology::Topology;
use nubla_ingest::bulk_indexer::BulkIndexer;
use nubla_ingest::config::Config;
use nubla_ingest::host_tenant_map::HostTenantMap;
use nubla_ingest::schema_validator::{self, SchemaValidator};
use nubla_ingest::metrics;
use nubla_ingest::search_client::SearchClient;
use nubla_ingest::tenant_registry::TenantRegistry;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(metrics_port = config.metrics_port, "starting_consumer");

    if let Err(error) = metrics::install(config.metrics_port) {
        error!(%error, "metrics_exporter_install_failed");
    }

    let tenants = Arc::new(TenantRegistry::new(&config.tenants_registry_path));
    metrics::set_tenant_registry_size(tenants.len());

    let host_tenant_map =
        HostTenantMap::load(std::path::Path::new(&config.host_tenant_map_path));

    let validator = match &config.schema_local_path {
        Some(path) => {
            let loaded = SchemaValidator::load(path);
            if loaded.is_none() {
                schema_validator::log_degraded_mode(path);
            }
            loaded
        }
        None => None,
    };

    let search = SearchClient::new(&config.search.host, config.search.basic_auth());
    search.wait_until_ready(30, Duration::from_secs(2)).await?;

    let bulk = config
        .bulk
        .enabled
        .then(|| BulkIndexer::new(config.bulk.max_items, config.bulk.max_interval_ms, None));

    let amqp_uri = format!(
        "amqp://{}:{}@{}:{}/{}",
        config.broker.user,
        config.broker.password,
        config.broker.host,
        config.broker.port,
        urlencoding_vhost(&config.broker.vhost),
    );
    let connection = Connection::connect(&amqp_uri, ConnectionProperties::default()).await?;
    info!("broker_connected");

    let channel = Topology::declare(&connection, &config.broker, config.force_recreate).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    let default_tenant = config.default_tenant.clone();
    let consumer = Consumer {
        channel,
        config,
        tenants,
        host_tenant_map,
        validator,
        search,
        bulk,
        default_tenant,
    };
    consumer.run(shutdown_rx).await;

    connection.close(200, "shutdown").await?;
    info!("consumer_exited");
    Ok(())
}

/// AMQP vhost segments need percent-encoding in a URI; `/` (the default
/// vhost) is the only character this deployment's config ever contains.
fn urlencoding_vhost(vhost: &str) -> String {
    vhost.replace('/', "%2F")
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown_signal_received");
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown_signal_received");
}
