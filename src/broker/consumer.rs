//! Consumer (spec.md §4.H).
//!
//! The main loop: receive → normalize → validate → route → ack/reject.
//! Single-threaded cooperative within one process (spec.md §5) — this is
//! modeled as one Tokio task driving a `lapin` consumer stream; horizontal
//! scaling comes from running more processes against the same durable
//! queue, not from internal concurrency.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{BasicProperties, Channel};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::bulk_indexer::{BulkIndexer, FlushOutcome};
use crate::config::Config;
use crate::error::RejectReason;
use crate::event::{Event, map_consumer_severity};
use crate::host_tenant_map::HostTenantMap;
use crate::normalizer;
use crate::preparer;
use crate::schema_validator::SchemaValidator;
use crate::search_client::SearchClient;
use crate::tenant_registry::TenantRegistry;

pub struct Consumer {
    pub channel: Channel,
    pub config: Config,
    pub tenants: Arc<TenantRegistry>,
    pub host_tenant_map: HostTenantMap,
    pub validator: Option<SchemaValidator>,
    pub search: SearchClient,
    pub bulk: Option<BulkIndexer>,
    pub default_tenant: Option<String>,
}

impl Consumer {
    /// Runs until `shutdown` resolves. On shutdown, best-effort flushes
    /// any pending bulk buffer and returns (spec.md §5 cancellation
    /// policy) — the caller is responsible for closing the channel and
    /// connection afterward.
    pub async fn run(mut self, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        if let Err(error) = self
            .channel
            .basic_qos(self.config.broker.prefetch, BasicQosOptions::default())
            .await
        {
            error!(%error, "basic_qos_failed");
            return;
        }

        let mut consumer = match self
            .channel
            .basic_consume(
                &self.config.broker.queue,
                "nubla-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
        {
            Ok(c) => c,
            Err(error) => {
                error!(%error, "basic_consume_failed");
                return;
            }
        };
        info!("consumer_started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("consumer_shutdown_signal_received");
                    break;
                }
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                        Some(Err(error)) => {
                            warn!(%error, "broker_delivery_error");
                        }
                        None => {
                            warn!("broker_consumer_stream_closed");
                            break;
                        }
                    }
                }
            }
        }

        if let Some(bulk) = self.bulk.as_mut() {
            if !bulk.is_empty() {
                info!("flushing_bulk_buffer_on_shutdown");
                let _ = bulk.flush(&self.search).await;
            }
        }
        info!("consumer_stopped");
    }

    async fn handle_delivery(&mut self, delivery: lapin::message::Delivery) {
        metrics::counter!("events_processed_total").increment(1);
        let raw: Value = match serde_json::from_slice(&delivery.data) {
            Ok(v) => v,
            Err(_) => {
                self.reject(delivery, RejectReason::ProcessingException).await;
                return;
            }
        };

        let normalize_start = Instant::now();
        let normalized = normalizer::normalize(raw);
        metrics::histogram!("normalizer_latency_seconds").record(normalize_start.elapsed().as_secs_f64());

        let Some(mut event) = Event::from_value(normalized) else {
            self.reject(delivery, RejectReason::ProcessingException).await;
            return;
        };

        // Host→tenant override: only when routing currently resolves to the
        // default tenant (spec.md §4.H step 4).
        if is_unrouted(event.tenant_id()) {
            if let Some(host) = event.get_str("host").map(str::to_string) {
                if let Some(mapped) = self.host_tenant_map.lookup(&host) {
                    event.set_tenant_id(mapped.to_string());
                }
            }
        }

        if let Some(raw_severity) = event.get_str("severity").map(str::to_string) {
            let mapped = map_consumer_severity(&raw_severity);
            event.set("severity", Value::String(mapped));
        }

        // The normalizer always fills a missing tenant_id with "default"
        // (spec.md §4.B.7), so by this point the field is never actually
        // absent; treat that sentinel the same as absent here (mirroring
        // step 4 above), or REQUIRE_TENANT could never reject anything.
        if self.config.require_tenant && is_unrouted(event.tenant_id()) {
            self.reject(delivery, RejectReason::MissingTenantId).await;
            return;
        }

        let prepared = preparer::prepare(event, self.default_tenant.as_deref());

        if let Some(validator) = &self.validator {
            let errors = validator.validate(&Value::Object(prepared.0.clone()));
            if !errors.is_empty() {
                let sample: Vec<_> = errors.iter().take(5).map(|e| e.message.clone()).collect();
                warn!(errors = ?sample, "validation_failed");
                metrics::counter!("events_validation_failed_total").increment(1);
                self.reject(delivery, RejectReason::ValidationFailed).await;
                return;
            }
        }

        let Some(tenant_id) = prepared.tenant_id().map(str::to_string) else {
            self.reject(delivery, RejectReason::UnknownTenantId).await;
            return;
        };
        if !self.tenants.is_valid(&tenant_id) {
            self.reject(delivery, RejectReason::UnknownTenantId).await;
            return;
        }

        let index = format!("logs-{tenant_id}");
        let source = prepared.into_value();

        if let Some(bulk) = self.bulk.as_mut() {
            bulk.add(index, source, None);
            self.ack(delivery).await;
            metrics::counter!("events_indexed_by_tenant_total", "tenant_id" => tenant_id).increment(1);

            if bulk.should_flush_now() {
                if let FlushOutcome::Failed { .. } = bulk.flush(&self.search).await {
                    // v1 policy: failure is logged and counted inside flush();
                    // the events were already acked, so nothing further to do here.
                }
            }
        } else {
            let index_start = Instant::now();
            match self.search.index(&index, &source, None, false).await {
                Ok(_) => {
                    metrics::histogram!("event_index_latency_seconds")
                        .record(index_start.elapsed().as_secs_f64());
                    metrics::counter!("events_indexed_total").increment(1);
                    metrics::counter!("events_indexed_by_tenant_total", "tenant_id" => tenant_id)
                        .increment(1);
                    self.ack(delivery).await;
                }
                Err(error) => {
                    error!(%error, tenant_id, "index_failed");
                    metrics::counter!("events_index_failed_total").increment(1);
                    self.reject(delivery, RejectReason::IndexFailed).await;
                }
            }
        }
    }

    async fn ack(&self, delivery: lapin::message::Delivery) {
        if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
            error!(%error, "ack_failed");
        }
    }

    /// Rejection policy (spec.md §4.H): manual republish to the DLX with
    /// `x-reject-reason`, or a plain nack (no requeue) leaving the broker
    /// to dead-letter the message, based on `USE_MANUAL_DLX`.
    async fn reject(&self, delivery: lapin::message::Delivery, reason: RejectReason) {
        metrics::counter!("events_nacked_total").increment(1);
        metrics::counter!("events_nacked_by_reason_total", "reason" => reason.as_str()).increment(1);

        if self.config.broker.manual_dlx {
            let mut headers = FieldTable::default();
            headers.insert(
                "x-reject-reason".into(),
                AMQPValue::LongString(LongString::from(reason.as_str())),
            );
            let properties = BasicProperties::default().with_headers(headers);
            let publish = self
                .channel
                .basic_publish(
                    &self.config.broker.dlx,
                    "",
                    BasicPublishOptions::default(),
                    &delivery.data,
                    properties,
                )
                .await;
            if let Err(error) = publish {
                error!(%error, reason = %reason, "dlx_publish_failed");
            }
            if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
                error!(%error, "ack_after_dlx_publish_failed");
            }
        } else if let Err(error) = delivery
            .nack(BasicNackOptions {
                requeue: false,
                ..Default::default()
            })
            .await
        {
            error!(%error, "nack_failed");
        }

        info!(reason = %reason, "event_rejected");
    }
}

/// True when `tenant_id` is absent or still the normalizer's `"default"`
/// sentinel (spec.md §4.B.7) — i.e. no vendor payload or upstream caller
/// ever actually assigned a real tenant. Shared by the host→tenant
/// override (step 4, only overrides when still unrouted) and the
/// `REQUIRE_TENANT` check (step 6, which must treat the sentinel as
/// missing or it can never reject).
fn is_unrouted(tenant_id: Option<&str>) -> bool {
    tenant_id.map(|t| t == "default").unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrouted_when_absent() {
        assert!(is_unrouted(None));
    }

    #[test]
    fn unrouted_when_default_sentinel() {
        assert!(is_unrouted(Some("default")));
    }

    #[test]
    fn routed_when_a_real_tenant_is_set() {
        assert!(!is_unrouted(Some("acme")));
    }
}
