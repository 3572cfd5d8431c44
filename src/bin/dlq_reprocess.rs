//! Operator CLI for draining and reprocessing the dead-letter queue.
//!
//! Grounded on `original_source/backend/app/tools/reprocess_dlq.py`: pulls
//! up to `--limit` messages one at a time with `basic_get`, fixes them up
//! via `dlq_reprocessor::plan_reprocess`, and republishes to the main
//! exchange with `x-reprocess-reason: dlq_reprocess`. `--dry-run` runs the
//! same transformation but requeues every message instead of publishing.

use clap::Parser;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{BasicProperties, Connection, ConnectionProperties};
use nubla_ingest::dlq_reprocessor::{plan_reprocess, ReprocessPlan, ReprocessSummary};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Drain and reprocess the dead-letter queue")]
struct Args {
    #[arg(long, env = "RABBITMQ_HOST", default_value = "127.0.0.1")]
    host: String,
    #[arg(long, env = "RABBITMQ_PORT", default_value_t = 5672)]
    port: u16,
    #[arg(long, env = "RABBITMQ_USER", default_value = "guest")]
    user: String,
    #[arg(long, env = "RABBITMQ_PASSWORD", default_value = "guest")]
    password: String,
    #[arg(long, env = "RABBITMQ_VHOST", default_value = "/")]
    vhost: String,
    #[arg(long, env = "RABBITMQ_DLQ", default_value = "nubla_logs_default.dlq")]
    dlq: String,
    #[arg(long, env = "RABBITMQ_EXCHANGE", default_value = "logs_default")]
    exchange: String,
    #[arg(long, env = "RABBITMQ_ROUTING_KEY", default_value = "nubla.log.default")]
    routing_key: String,
    #[arg(long, default_value_t = 100)]
    limit: u64,
    #[arg(long, default_value_t = 0)]
    sleep: u64,
    #[arg(long)]
    dry_run: bool,
    #[arg(long, default_value = "info")]
    severity_default: String,
    #[arg(long)]
    quarantine: Option<String>,
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let amqp_uri = format!(
        "amqp://{}:{}@{}:{}/{}",
        args.user,
        args.password,
        args.host,
        args.port,
        args.vhost.replace('/', "%2F"),
    );
    let connection = Connection::connect(&amqp_uri, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    let mut summary = ReprocessSummary::default();

    for _ in 0..args.limit {
        let got = channel
            .basic_get(&args.dlq, BasicGetOptions { no_ack: false })
            .await?;
        let Some(delivery) = got else {
            info!("dlq_drained");
            break;
        };
        summary.processed += 1;

        if args.dry_run {
            if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
                warn!(%error, "dry_run_ack_failed");
            }
            match plan_reprocess(&delivery.data, &args.severity_default) {
                ReprocessPlan::Republish(value) => {
                    summary.requeued_dry_run += 1;
                    info!(event = %value, "dry_run_would_republish");
                }
                ReprocessPlan::InvalidJson => {
                    summary.invalid_json += 1;
                    info!("dry_run_would_quarantine_invalid_json");
                }
            }
            continue;
        }

        match plan_reprocess(&delivery.data, &args.severity_default) {
            ReprocessPlan::Republish(value) => {
                let body = serde_json::to_vec(&value)?;
                let mut headers = FieldTable::default();
                headers.insert(
                    "x-reprocess-reason".into(),
                    AMQPValue::LongString(LongString::from("dlq_reprocess")),
                );
                let properties = BasicProperties::default().with_headers(headers);
                let publish = channel
                    .basic_publish(
                        &args.exchange,
                        &args.routing_key,
                        BasicPublishOptions::default(),
                        &body,
                        properties,
                    )
                    .await;

                match publish {
                    Ok(_) => {
                        delivery.ack(BasicAckOptions::default()).await?;
                        summary.published += 1;
                    }
                    Err(error) => {
                        warn!(%error, "dlq_republish_failed_requeueing");
                        delivery
                            .nack(BasicNackOptions {
                                requeue: true,
                                ..Default::default()
                            })
                            .await?;
                    }
                }
            }
            ReprocessPlan::InvalidJson => {
                if let Some(quarantine) = &args.quarantine {
                    channel
                        .basic_publish(
                            "",
                            quarantine,
                            BasicPublishOptions::default(),
                            &delivery.data,
                            BasicProperties::default(),
                        )
                        .await?;
                    summary.quarantined += 1;
                } else {
                    summary.invalid_json += 1;
                }
                delivery.ack(BasicAckOptions::default()).await?;
            }
        }

        if args.sleep > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(args.sleep)).await;
        }
    }

    let summary_json = serde_json::json!({
        "processed": summary.processed,
        "published": summary.published,
        "requeued_dry_run": summary.requeued_dry_run,
        "invalid_json": summary.invalid_json,
        "quarantined": summary.quarantined,
    });
    println!("{summary_json}");

    connection.close(200, "done").await?;
    Ok(())
}
