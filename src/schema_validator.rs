//! Schema Validator (spec.md §4.D).
//!
//! Loads a JSON-Schema (Draft-07) document once at startup. If loading
//! fails, no validator is constructed and the consumer runs in degraded
//! mode (validation skipped, logged once) per spec.md §7.

use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::{error, warn};

/// One validation failure, with a dotted JSON path and a human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

pub struct SchemaValidator {
    schema: JSONSchema,
}

impl SchemaValidator {
    /// Loads and compiles the schema at `path`. Returns `None` (rather
    /// than an error the caller must handle) on any failure — the
    /// degraded-mode decision belongs to the caller, which logs once and
    /// proceeds without validation.
    pub fn load(path: &str) -> Option<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(error) => {
                error!(%error, path, "schema_load_failed_io");
                return None;
            }
        };
        let document: Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(error) => {
                error!(%error, path, "schema_load_failed_parse");
                return None;
            }
        };
        // JSONSchema borrows from `document`; leak it to get a 'static
        // schema we can hold for the process lifetime. The crate is
        // loaded exactly once at startup, so this is a fixed, bounded
        // amount of memory, not a per-event leak.
        let document: &'static Value = Box::leak(Box::new(document));
        match JSONSchema::options()
            .with_draft(jsonschema::Draft::Draft7)
            .compile(document)
        {
            Ok(schema) => Some(Self { schema }),
            Err(error) => {
                error!(%error, path, "schema_compile_failed");
                None
            }
        }
    }

    pub fn validate(&self, event: &Value) -> Vec<ValidationError> {
        match self.schema.validate(event) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| ValidationError {
                    path: e.instance_path.to_string(),
                    message: e.to_string(),
                })
                .collect(),
        }
    }
}

/// Logs the one-time degraded-mode notice spec.md §7 requires.
pub fn log_degraded_mode(path: &str) {
    warn!(path, "schema_validator_disabled_degraded_mode");
}
