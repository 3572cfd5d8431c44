use snafu::Snafu;

/// Errors surfaced while turning the environment into a [`crate::config::Config`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("{var} must be a valid {kind}, got {value:?}"))]
    InvalidValue {
        var: &'static str,
        kind: &'static str,
        value: String,
    },
}

/// Errors raised by the search backend client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SearchClientError {
    #[snafu(display("search backend request failed: {source}"))]
    Request { source: reqwest::Error },

    #[snafu(display("search backend returned {status} for {operation}: {body}"))]
    Backend {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[snafu(display("search backend did not become ready after {attempts} attempts"))]
    NotReady { attempts: u32 },
}

/// Errors raised declaring or verifying broker topology. A precondition
/// mismatch on the active declare arrives from `lapin` as an ordinary
/// protocol error (AMQP reply code 406) and is represented here as
/// `Declare` like any other declare failure; `FORCE_RECREATE` only affects
/// whether that failure is logged and swallowed or propagated, not how
/// it's classified.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TopologyError {
    #[snafu(display("AMQP error declaring {entity}: {source}"))]
    Declare {
        entity: &'static str,
        source: lapin::Error,
    },
}

/// Reasons a message is rejected instead of indexed, mirroring spec.md §7.
///
/// The `Display` impl is what gets attached to the `x-reject-reason` header
/// and to the `events_nacked_by_reason_total` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingTenantId,
    ValidationFailed,
    UnknownTenantId,
    IndexFailed,
    ProcessingException,
    InvalidJson,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MissingTenantId => "missing_tenant_id",
            RejectReason::ValidationFailed => "validation_failed",
            RejectReason::UnknownTenantId => "unknown_tenant_id",
            RejectReason::IndexFailed => "index_failed",
            RejectReason::ProcessingException => "processing_exception",
            RejectReason::InvalidJson => "invalid_json",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
