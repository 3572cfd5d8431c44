//! Bulk Indexer (spec.md §4.F).
//!
//! In-memory buffer of `(index, source, pipeline)` actions flushed by size
//! or time. v1 partial-failure policy (spec.md §9(b)): on a whole-request
//! failure the buffer is cleared and a failure counter increments; no
//! automatic retry of the failed batch. The indexer is single-writer (the
//! consumer task), so no internal locking.

use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use crate::search_client::SearchClient;

pub const DEFAULT_MAX_ITEMS: usize = 500;
pub const DEFAULT_MAX_INTERVAL_MS: u64 = 1000;

pub struct BulkIndexer {
    buffer: Vec<(String, Value, Option<String>)>,
    max_items: usize,
    max_interval_ms: u64,
    default_pipeline: Option<String>,
    last_flush: Instant,
}

impl BulkIndexer {
    pub fn new(max_items: usize, max_interval_ms: u64, default_pipeline: Option<String>) -> Self {
        metrics::gauge!("consumer_buffer_size").set(0.0);
        Self {
            buffer: Vec::new(),
            max_items,
            max_interval_ms,
            default_pipeline,
            last_flush: Instant::now(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_ITEMS, DEFAULT_MAX_INTERVAL_MS, None)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.max_items
            || self.last_flush.elapsed().as_millis() as u64 >= self.max_interval_ms
    }

    /// Buffers one action. Callers check `should_flush_now` separately
    /// before calling `flush`, since flushing requires an async search
    /// backend call the buffer itself does not own.
    pub fn add(&mut self, index: impl Into<String>, source: Value, pipeline: Option<String>) {
        let pipeline = pipeline.or_else(|| self.default_pipeline.clone());
        self.buffer.push((index.into(), source, pipeline));
        metrics::gauge!("consumer_buffer_size").set(self.buffer.len() as f64);
    }

    pub fn should_flush_now(&self) -> bool {
        self.should_flush()
    }

    /// Issues a single bulk request for the buffered actions. The buffer
    /// is always cleared afterward, win or lose (v1 policy): success logs
    /// per-item error counts if OpenSearch reported any; failure clears
    /// and increments a failure counter rather than retrying.
    pub async fn flush(&mut self, client: &SearchClient) -> FlushOutcome {
        if self.buffer.is_empty() {
            return FlushOutcome::Empty;
        }
        let items = std::mem::take(&mut self.buffer);
        let count = items.len();
        metrics::gauge!("consumer_buffer_size").set(0.0);
        self.last_flush = Instant::now();

        let outcome = match client.bulk(&items).await {
            Ok(result) => {
                metrics::counter!("bulk_flushes_total").increment(1);
                if result.had_errors {
                    warn!(items = count, "bulk_flush_partial_errors");
                } else {
                    info!(items = count, "bulk_flush_ok");
                    metrics::counter!("events_indexed_total").increment(count as u64);
                }
                FlushOutcome::Flushed {
                    item_count: count,
                    had_errors: result.had_errors,
                }
            }
            Err(error) => {
                metrics::counter!("events_index_failed_total").increment(count as u64);
                warn!(items = count, %error, "bulk_flush_failed");
                FlushOutcome::Failed { item_count: count }
            }
        };
        outcome
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    Empty,
    Flushed { item_count: usize, had_errors: bool },
    Failed { item_count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flush_not_needed_below_thresholds() {
        let mut indexer = BulkIndexer::new(3, 60_000, None);
        indexer.add("logs-acme", json!({"a": 1}), None);
        assert!(!indexer.should_flush_now());
        assert_eq!(indexer.len(), 1);
    }

    #[test]
    fn size_trigger_flushes_at_max_items() {
        let mut indexer = BulkIndexer::new(3, 60_000, None);
        indexer.add("logs-acme", json!({"a": 1}), None);
        indexer.add("logs-acme", json!({"a": 2}), None);
        assert!(!indexer.should_flush_now());
        indexer.add("logs-acme", json!({"a": 3}), None);
        assert!(indexer.should_flush_now());
    }

    #[test]
    fn time_trigger_flushes_after_interval() {
        let mut indexer = BulkIndexer::new(500, 0, None);
        indexer.add("logs-acme", json!({"a": 1}), None);
        assert!(indexer.should_flush_now());
    }

    #[test]
    fn default_pipeline_applied_when_not_overridden() {
        let mut indexer = BulkIndexer::new(500, 60_000, Some("enrich".to_string()));
        indexer.add("logs-acme", json!({}), None);
        assert_eq!(indexer.buffer[0].2.as_deref(), Some("enrich"));
    }

    #[test]
    fn per_call_pipeline_overrides_default() {
        let mut indexer = BulkIndexer::new(500, 60_000, Some("enrich".to_string()));
        indexer.add("logs-acme", json!({}), Some("other".to_string()));
        assert_eq!(indexer.buffer[0].2.as_deref(), Some("other"));
    }
}
