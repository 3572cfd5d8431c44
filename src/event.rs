//! The canonical event, as a `serde_json::Map` rather than a fixed struct.
//!
//! Vendor payloads are too heterogeneous to model as one struct (spec.md
//! §3/§9: "untyped input, tagged record" — the union lives in `dataset`,
//! not in Rust's type system, since the set of vendor fields is open and
//! schema-validated downstream rather than statically typed). `Event` is a
//! thin newtype over the JSON object so call sites get `get`/`insert`
//! ergonomics without reaching for raw `serde_json::Value` everywhere, and
//! so `tenant_id`/`@timestamp` accessors stay in one place.

use serde_json::{Map, Value};

pub const FIELD_TENANT_ID: &str = "tenant_id";
pub const FIELD_TIMESTAMP: &str = "@timestamp";
pub const FIELD_DATASET: &str = "dataset";
pub const FIELD_SCHEMA_VERSION: &str = "schema_version";
pub const FIELD_SEVERITY: &str = "severity";
pub const FIELD_SEVERITY_ORIGINAL: &str = "severity_original";

pub const DEFAULT_DATASET: &str = "syslog.generic";
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";
pub const DEFAULT_TENANT_ID: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct Event(pub Map<String, Value>);

impl Event {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.0.get(FIELD_TENANT_ID).and_then(Value::as_str)
    }

    pub fn set_tenant_id(&mut self, tenant_id: impl Into<String>) {
        self.0
            .insert(FIELD_TENANT_ID.to_string(), Value::String(tenant_id.into()));
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.0.get(FIELD_TIMESTAMP).and_then(Value::as_str)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn set_path(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry.as_object_mut().expect("just ensured object");
        }
        current.insert(last.to_string(), value);
    }

    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let mut current: &Value = self.0.get(*path.first()?)?;
        for segment in &path[1..] {
            current = current.get(segment)?;
        }
        Some(current)
    }
}

/// The fixed severity enum from spec.md §3. `severity_original` always
/// preserves the raw input string alongside this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    pub fn parse_enum(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

/// Consumer-side severity normalization (spec.md §4.H step 5): the fixed
/// table `{error→critical, alert→high, warning→medium, warn→medium}`;
/// anything else passes through lowercased (SPEC_FULL.md §9(a) picks this
/// mapping over the conflicting `alert→info` seen in other source
/// revisions — see DESIGN.md).
pub fn map_consumer_severity(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "error" => Severity::Critical.as_str().to_string(),
        "alert" => Severity::High.as_str().to_string(),
        "warning" | "warn" => Severity::Medium.as_str().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod severity_tests {
    use super::*;

    #[test]
    fn fixed_table_mappings() {
        assert_eq!(map_consumer_severity("error"), "critical");
        assert_eq!(map_consumer_severity("ALERT"), "high");
        assert_eq!(map_consumer_severity("warning"), "medium");
        assert_eq!(map_consumer_severity("warn"), "medium");
    }

    #[test]
    fn unknown_severity_passes_through_lowercased() {
        assert_eq!(map_consumer_severity("CRITICAL"), "critical");
        assert_eq!(map_consumer_severity("notice"), "notice");
    }
}
