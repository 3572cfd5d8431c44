//! Standalone topology declaration, for operators who want to provision the
//! exchange/queue/DLX/DLQ without starting a consumer process (e.g. ahead
//! of a blue/green deploy, or in a Terraform-adjacent provisioning step).

use lapin::{Connection, ConnectionProperties};
use nubla_ingest::broker::topology::Topology;
use nubla_ingest::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let amqp_uri = format!(
        "amqp://{}:{}@{}:{}/{}",
        config.broker.user,
        config.broker.password,
        config.broker.host,
        config.broker.port,
        config.broker.vhost.replace('/', "%2F"),
    );
    let connection = Connection::connect(&amqp_uri, ConnectionProperties::default()).await?;

    Topology::declare(&connection, &config.broker, config.force_recreate).await?;
    info!("topology_declared");

    connection.close(200, "done").await?;
    Ok(())
}
