//! Error types surfaced to callers of this crate (spec §7).

use serde::Serialize;
use thiserror::Error;

use flow_core::error::Severity;
use flow_core::process::ProcessError;

/// Construction-time validation failures (spec §4.5.1). Surfaced from
/// `Network::construct`/`Flow::create`; never retried.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("node '{node}' references unknown process type '{kind}'")]
    UnknownProcessType { node: String, kind: String },

    #[error("process factory for node '{node}' (type '{kind}') failed: {message}")]
    FactoryFailed { node: String, kind: String, message: String },

    #[error("edge references unknown node '{node}'")]
    UnknownNode { node: String },

    #[error("node '{node}' has no port named '{port}'")]
    UnknownPort { node: String, port: String },

    #[error("edge source '{node}.{port}' is not an output port")]
    SourceNotOutput { node: String, port: String },

    #[error("edge sink '{node}.{port}' is not an input port")]
    SinkNotInput { node: String, port: String },

    #[error("carrier type mismatch on edge {from_node}.{from_port} -> {to_node}.{to_port}: {expected} vs {actual}")]
    CarrierTypeMismatch {
        from_node: String,
        from_port: String,
        to_node: String,
        to_port: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("port '{node}.{port}' would exceed its maximum of {max} connections")]
    ArityExceeded { node: String, port: String, max: usize },

    #[error("required port '{node}.{port}' is neither connected nor given an initial value")]
    RequiredPortUnsatisfied { node: String, port: String },

    #[error("initial value target '{node}.{port}' is not an input port")]
    InitialValueTargetNotInput { node: String, port: String },

    #[error("process type '{name}' is already registered under a different factory")]
    DuplicateProcessType { name: String },
}

/// Startup/runtime/fatal failures of a running `Network` (spec §4.5.5,
/// §7). Renders to the `{code, message, details}` shape callers see.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("process '{node}' failed to initialize: {source}")]
    InitializeFailed { node: String, source: ProcessError },

    #[error("delivering initial value to '{node}.{port}' timed out after {millis}ms")]
    InitialValueTimeout { node: String, port: String, millis: u64 },

    #[error("delivering initial value to '{node}.{port}' failed: {source}")]
    InitialValueFailed { node: String, port: String, source: ProcessError },

    #[error("process '{node}' failed: {source}")]
    ProcessFailed { node: String, source: ProcessError },

    #[error("process '{node}' panicked: {message}")]
    ProcessPanicked { node: String, message: String },

    #[error("shutdown deadline of {millis}ms elapsed before every process returned")]
    ShutdownTimedOut { millis: u64 },
}

impl NetworkError {
    /// The severity this error surfaces at (spec §4.5.5). Every variant
    /// here is `Error` or `Fatal`; lower severities never construct a
    /// `NetworkError` at all, they go straight to the observer.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::ProcessPanicked { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// The stable machine-readable code half of the caller-facing
    /// `{code, message, details}` triple (spec §6).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InitializeFailed { .. } => "initialize_failed",
            Self::InitialValueTimeout { .. } => "initial_value_timeout",
            Self::InitialValueFailed { .. } => "initial_value_failed",
            Self::ProcessFailed { .. } => "process_failed",
            Self::ProcessPanicked { .. } => "process_panicked",
            Self::ShutdownTimedOut { .. } => "shutdown_timed_out",
        }
    }

    /// The node this error names, if any — used to build the per-process
    /// error list a caller can inspect after `stop` (spec §7).
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::InitializeFailed { node, .. }
            | Self::InitialValueTimeout { node, .. }
            | Self::InitialValueFailed { node, .. }
            | Self::ProcessFailed { node, .. }
            | Self::ProcessPanicked { node, .. } => Some(node),
            Self::ShutdownTimedOut { .. } => None,
        }
    }
}

/// The caller-facing rendering of a `NetworkError` (spec §6): `{code,
/// message, details}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub details: Option<String>,
}

impl From<&NetworkError> for ErrorDetail {
    fn from(err: &NetworkError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            details: err.node().map(|n| format!("node={n}")),
        }
    }
}
