//! Broker Topology (spec.md §4.G).
//!
//! Declares the exchange/DLX/queue/DLQ idempotently. Existence is first
//! probed with a passive declare; a failed passive declare means the
//! entity doesn't exist yet and gets created on a fresh channel (AMQP
//! closes the channel on a failed passive declare, so every subsequent
//! declare on that connection needs a new channel). A precondition
//! mismatch on the *active* declare is a hard failure by default
//! (spec.md §4.G/§7); `FORCE_RECREATE=true` downgrades it to a logged
//! warning that keeps using the existing entity (SPEC_FULL.md
//! supplemented feature, grounded on `infra/rabbitmq/declare_topology.py`
//! — AMQP has no "redeclare over" primitive, so even with the escape
//! hatch an actual delete+recreate still requires an operator).

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{Channel, Connection, ExchangeKind};
use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::error::{DeclareSnafu, TopologyError};
use snafu::ResultExt;

pub struct Topology;

impl Topology {
    /// Declares the full topology described in spec.md §4.G. Returns the
    /// channel the caller should keep using for consumption.
    pub async fn declare(
        conn: &Connection,
        config: &BrokerConfig,
        force_recreate: bool,
    ) -> Result<Channel, TopologyError> {
        let mut channel = conn
            .create_channel()
            .await
            .context(DeclareSnafu { entity: "channel" })?;

        ensure_exchange(&mut channel, conn, &config.exchange, force_recreate).await?;
        ensure_exchange(&mut channel, conn, &config.dlx, force_recreate).await?;

        let mut queue_args = FieldTable::default();
        queue_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(LongString::from(config.dlx.as_str())),
        );
        ensure_queue(&mut channel, conn, &config.queue, queue_args, force_recreate).await?;
        ensure_queue(
            &mut channel,
            conn,
            &config.dlq,
            FieldTable::default(),
            force_recreate,
        )
        .await?;

        channel
            .queue_bind(
                &config.queue,
                &config.exchange,
                &config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .context(DeclareSnafu {
                entity: "queue binding",
            })?;
        info!(queue = %config.queue, exchange = %config.exchange, routing_key = %config.routing_key, "binding_declared");

        channel
            .queue_bind(
                &config.dlq,
                &config.dlx,
                "#",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .context(DeclareSnafu {
                entity: "dlq binding",
            })?;
        info!(dlq = %config.dlq, dlx = %config.dlx, "dlq_binding_declared");

        Ok(channel)
    }
}

async fn ensure_exchange(
    channel: &mut Channel,
    conn: &Connection,
    name: &str,
    force_recreate: bool,
) -> Result<(), TopologyError> {
    let passive = channel
        .exchange_declare(
            name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                passive: true,
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await;

    if passive.is_ok() {
        info!(exchange = name, "exchange_exists");
        return Ok(());
    }

    // The passive declare closed the channel; open a fresh one to create it.
    *channel = conn
        .create_channel()
        .await
        .context(DeclareSnafu { entity: "channel" })?;

    let declared = channel
        .exchange_declare(
            name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await;

    match declared {
        Ok(()) => {
            info!(exchange = name, "exchange_declared");
            Ok(())
        }
        Err(source) if force_recreate => {
            warn!(
                exchange = name,
                %source,
                "exchange_precondition_mismatch_continuing_with_existing_entity"
            );
            *channel = conn
                .create_channel()
                .await
                .context(DeclareSnafu { entity: "channel" })?;
            Ok(())
        }
        Err(source) => Err(TopologyError::Declare {
            entity: "exchange",
            source,
        }),
    }
}

async fn ensure_queue(
    channel: &mut Channel,
    conn: &Connection,
    name: &str,
    arguments: FieldTable,
    force_recreate: bool,
) -> Result<(), TopologyError> {
    let passive = channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                passive: true,
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await;

    if passive.is_ok() {
        info!(queue = name, "queue_exists");
        return Ok(());
    }

    *channel = conn
        .create_channel()
        .await
        .context(DeclareSnafu { entity: "channel" })?;

    let declared = channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            arguments,
        )
        .await;

    match declared {
        Ok(_) => {
            info!(queue = name, "queue_declared");
            Ok(())
        }
        Err(source) if force_recreate => {
            warn!(
                queue = name,
                %source,
                "queue_precondition_mismatch_continuing_with_existing_entity"
            );
            *channel = conn
                .create_channel()
                .await
                .context(DeclareSnafu { entity: "channel" })?;
            Ok(())
        }
        Err(source) => Err(TopologyError::Declare {
            entity: "queue",
            source,
        }),
    }
}
