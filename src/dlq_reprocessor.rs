//! DLQ Reprocessor (spec.md §4.I).
//!
//! Operator tool: drains up to N messages from the DLQ, re-normalizes,
//! annotates, and republishes to the main exchange — or quarantines
//! non-JSON bodies. Pure transformation logic lives here so it can be unit
//! tested without a broker; `src/bin/dlq_reprocess.rs` wires it to a real
//! `lapin` connection and the CLI surface.

use serde_json::Value;

use crate::event::{
    DEFAULT_DATASET, DEFAULT_SCHEMA_VERSION, DEFAULT_TENANT_ID, Event, FIELD_DATASET,
    FIELD_SCHEMA_VERSION, FIELD_SEVERITY, FIELD_TIMESTAMP,
};
use crate::normalizer;

/// Outcome of inspecting one DLQ body before any broker action is taken.
pub enum ReprocessPlan {
    /// Body wasn't valid JSON; caller quarantines or acks-drops per config.
    InvalidJson,
    /// Body was transformed and is ready to republish (or, in `--dry-run`,
    /// just to report).
    Republish(Value),
}

/// Parses and fixes one DLQ message body (spec.md §4.I / §8 scenario 6):
/// re-normalizes, fills a null/missing severity with `severity_default`,
/// ensures `tenant_id` (falling back to `default`), and stamps
/// `dlq_reprocess=true`.
pub fn plan_reprocess(raw_body: &[u8], severity_default: &str) -> ReprocessPlan {
    let Ok(value) = serde_json::from_slice::<Value>(raw_body) else {
        return ReprocessPlan::InvalidJson;
    };

    let normalized = normalizer::normalize(value);
    let Some(mut event) = Event::from_value(normalized) else {
        return ReprocessPlan::InvalidJson;
    };

    let severity_is_null_or_missing = match event.0.get(FIELD_SEVERITY) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) if s.is_empty() || s == "null" => true,
        _ => false,
    };
    if severity_is_null_or_missing {
        event.set(FIELD_SEVERITY, Value::String(severity_default.to_string()));
    }

    if event.get_str(FIELD_DATASET).is_none() {
        event.set(FIELD_DATASET, Value::String(DEFAULT_DATASET.to_string()));
    }
    if event.get_str(FIELD_SCHEMA_VERSION).is_none() {
        event.set(
            FIELD_SCHEMA_VERSION,
            Value::String(DEFAULT_SCHEMA_VERSION.to_string()),
        );
    }
    if event.tenant_id().is_none() {
        event.set_tenant_id(DEFAULT_TENANT_ID);
    }
    if event.get_str(FIELD_TIMESTAMP).is_none() {
        let fallback = event
            .get_str("timestamp")
            .map(str::to_string)
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
        event.set(FIELD_TIMESTAMP, Value::String(fallback));
    }

    event.set("dlq_reprocess", Value::Bool(true));

    ReprocessPlan::Republish(event.into_value())
}

/// Summary counters printed at the end of a reprocessor run, matching the
/// JSON summary object `reprocess_dlq.py` prints to stdout.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReprocessSummary {
    pub processed: u64,
    pub published: u64,
    pub requeued_dry_run: u64,
    pub invalid_json: u64,
    pub quarantined: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_json_body() {
        let plan = plan_reprocess(b"not json", "info");
        assert!(matches!(plan, ReprocessPlan::InvalidJson));
    }

    #[test]
    fn null_severity_gets_default() {
        let body = json!({"tenant_id": "acme", "message": "x", "severity": null})
            .to_string();
        let plan = plan_reprocess(body.as_bytes(), "info");
        let ReprocessPlan::Republish(value) = plan else {
            panic!("expected Republish");
        };
        assert_eq!(value["severity"], "info");
        assert_eq!(value["dlq_reprocess"], true);
        assert_eq!(value["tenant_id"], "acme");
    }

    #[test]
    fn missing_tenant_id_defaults() {
        let body = json!({"message": "x"}).to_string();
        let plan = plan_reprocess(body.as_bytes(), "info");
        let ReprocessPlan::Republish(value) = plan else {
            panic!("expected Republish");
        };
        assert_eq!(value["tenant_id"], "default");
    }

    #[test]
    fn empty_string_severity_is_treated_as_missing() {
        let body = json!({"tenant_id": "acme", "message": "x", "severity": ""}).to_string();
        let plan = plan_reprocess(body.as_bytes(), "low");
        let ReprocessPlan::Republish(value) = plan else {
            panic!("expected Republish");
        };
        assert_eq!(value["severity"], "low");
    }

    #[test]
    fn existing_severity_is_preserved() {
        let body = json!({"tenant_id": "acme", "message": "x", "severity": "critical"}).to_string();
        let plan = plan_reprocess(body.as_bytes(), "info");
        let ReprocessPlan::Republish(value) = plan else {
            panic!("expected Republish");
        };
        assert_eq!(value["severity"], "critical");
    }
}
