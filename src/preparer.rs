//! Event Preparer (spec.md §4.C).
//!
//! Fills `@timestamp`/`dataset`/`schema_version` defaults and coerces any
//! datetime-typed value to RFC-3339 UTC. Idempotent: preparing an already
//! prepared event is a no-op (spec.md invariant).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::event::{
    DEFAULT_DATASET, DEFAULT_SCHEMA_VERSION, Event, FIELD_DATASET, FIELD_SCHEMA_VERSION,
    FIELD_TENANT_ID, FIELD_TIMESTAMP,
};

/// Spec.md §9(c): "present but empty" (empty string, or `0` for a numeric
/// timestamp) is treated as absent — `prepare_event` never leaves a
/// falsy-but-present `@timestamp` unfilled.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(_) => true,
    }
}

pub fn prepare(mut event: Event, default_tenant: Option<&str>) -> Event {
    if !is_present(event.0.get(FIELD_TIMESTAMP)) {
        let fallback = event
            .0
            .get("timestamp")
            .filter(|v| is_present(Some(v)))
            .cloned();
        let value = match fallback {
            Some(v) => coerce_to_rfc3339(&v).unwrap_or_else(|| Utc::now().to_rfc3339()),
            None => Utc::now().to_rfc3339(),
        };
        event.set(FIELD_TIMESTAMP, Value::String(value));
    } else if let Some(coerced) = event
        .0
        .get(FIELD_TIMESTAMP)
        .and_then(coerce_to_rfc3339)
    {
        event.set(FIELD_TIMESTAMP, Value::String(coerced));
    }

    if !is_present(event.0.get(FIELD_DATASET)) {
        event.set(FIELD_DATASET, Value::String(DEFAULT_DATASET.to_string()));
    }
    // schema_version must be a semver string downstream consumers can
    // range-compare against; a missing or unparseable value falls back
    // to the current default rather than reaching the indexer malformed.
    match event.get_str(FIELD_SCHEMA_VERSION) {
        Some(existing) if semver::Version::parse(existing).is_ok() => {}
        _ => {
            event.set(
                FIELD_SCHEMA_VERSION,
                Value::String(DEFAULT_SCHEMA_VERSION.to_string()),
            );
        }
    }
    if !is_present(event.0.get(FIELD_TENANT_ID)) {
        if let Some(default_tenant) = default_tenant {
            event.set_tenant_id(default_tenant);
        }
    }

    event
}

/// Coerces a datetime-typed value (RFC-3339 string, or a naive string
/// lacking an offset, assumed UTC) to an RFC-3339 UTC string. Returns
/// `None` for values that aren't recognizable as a timestamp, leaving the
/// caller to fall back to "now".
fn coerce_to_rfc3339(value: &Value) -> Option<String> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).to_rfc3339());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).to_rfc3339());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).to_rfc3339());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> Event {
        Event::from_value(value).unwrap()
    }

    #[test]
    fn fills_all_three_defaults() {
        let prepared = prepare(event(json!({})), None);
        assert!(prepared.get_str(FIELD_TIMESTAMP).is_some());
        assert_eq!(prepared.get_str(FIELD_DATASET), Some(DEFAULT_DATASET));
        assert_eq!(
            prepared.get_str(FIELD_SCHEMA_VERSION),
            Some(DEFAULT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn copies_timestamp_field_when_at_timestamp_missing() {
        let prepared = prepare(
            event(json!({"timestamp": "2025-01-01T00:00:00+00:00"})),
            None,
        );
        assert_eq!(
            prepared.get_str(FIELD_TIMESTAMP),
            Some("2025-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn naive_datetime_assumed_utc() {
        let prepared = prepare(event(json!({"@timestamp": "2025-01-01 12:00:00"})), None);
        assert_eq!(
            prepared.get_str(FIELD_TIMESTAMP),
            Some("2025-01-01T12:00:00+00:00")
        );
    }

    #[test]
    fn empty_string_timestamp_treated_as_absent() {
        let prepared = prepare(event(json!({"@timestamp": ""})), None);
        let ts = prepared.get_str(FIELD_TIMESTAMP).unwrap();
        assert_ne!(ts, "");
    }

    #[test]
    fn default_tenant_filled_when_configured() {
        let prepared = prepare(event(json!({})), Some("acme"));
        assert_eq!(prepared.tenant_id(), Some("acme"));
    }

    #[test]
    fn no_default_tenant_leaves_tenant_id_absent() {
        let prepared = prepare(event(json!({})), None);
        assert_eq!(prepared.tenant_id(), None);
    }

    #[test]
    fn idempotent() {
        let once = prepare(event(json!({"message": "hi"})), Some("acme"));
        let twice = prepare(Event::new(once.0.clone()), Some("acme"));
        assert_eq!(once.0, twice.0);
    }

    #[test]
    fn malformed_schema_version_replaced_with_default() {
        let prepared = prepare(event(json!({"schema_version": "not-semver"})), None);
        assert_eq!(
            prepared.get_str(FIELD_SCHEMA_VERSION),
            Some(DEFAULT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn valid_schema_version_untouched() {
        let prepared = prepare(event(json!({"schema_version": "2.3.1"})), None);
        assert_eq!(prepared.get_str(FIELD_SCHEMA_VERSION), Some("2.3.1"));
    }

    #[test]
    fn existing_valid_timestamp_untouched() {
        let prepared = prepare(
            event(json!({"@timestamp": "2025-06-01T00:00:00+00:00"})),
            None,
        );
        assert_eq!(
            prepared.get_str(FIELD_TIMESTAMP),
            Some("2025-06-01T00:00:00+00:00")
        );
    }
}
