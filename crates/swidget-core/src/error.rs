// ── Core error types ──
//
// User-facing errors from swidget-core. Consumers never match on raw
// transport failures; the `From<swidget_api::Error>` impl folds them into
// the variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Connection closed before the device answered")]
    ConnectionClosed,

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Socket protocol errors ───────────────────────────────────────
    #[error("Malformed frame from device: {reason}")]
    MalformedFrame { reason: String },

    #[error("Device did not answer command {correlation_id} within {timeout_ms}ms")]
    CommandTimeout { correlation_id: u64, timeout_ms: u64 },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation} ({reason})")]
    UnsupportedOperation { operation: String, reason: String },

    #[error("Command rejected by device: {message}")]
    Rejected { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Provisioning failed: {message}")]
    Provisioning { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn unsupported(operation: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.to_owned(),
            reason: reason.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<swidget_api::Error> for CoreError {
    fn from(err: swidget_api::Error) -> Self {
        match err {
            swidget_api::Error::AuthenticationFailed { reason } => {
                CoreError::AuthenticationFailed { message: reason }
            }
            swidget_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        host: e
                            .url()
                            .and_then(|u| u.host_str().map(str::to_owned))
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            swidget_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            swidget_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            swidget_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                host: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            swidget_api::Error::Io(e) => CoreError::ConnectionFailed {
                host: String::new(),
                reason: e.to_string(),
            },
            swidget_api::Error::Http { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            swidget_api::Error::ConnectionFailed(reason) => CoreError::ConnectionFailed {
                host: String::new(),
                reason,
            },
            swidget_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                host: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            swidget_api::Error::MalformedFrame { reason } => CoreError::MalformedFrame { reason },
            swidget_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            swidget_api::Error::Provisioning { reason } => CoreError::Provisioning { message: reason },
            swidget_api::Error::UnsupportedOperation(op) => CoreError::UnsupportedOperation {
                operation: op.to_owned(),
                reason: "not available over the current transport".into(),
            },
        }
    }
}
