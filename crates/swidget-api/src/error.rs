use thiserror::Error;

/// Top-level error type for the `swidget-api` crate.
///
/// Covers every failure mode across both transports: the HTTP API,
/// the authenticated websocket, discovery, and provisioning.
/// `swidget-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The device rejected our credentials (HTTP 401/403 or a failed
    /// websocket challenge).
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS configuration or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Socket-level I/O failure (discovery, raw sockets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── HTTP API ────────────────────────────────────────────────────
    /// Non-success HTTP status from the device.
    #[error("Device API error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// The websocket could not be opened.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket closed by the device or by us.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// An inbound frame could not be parsed at all.
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Provisioning ────────────────────────────────────────────────
    /// Wi-Fi provisioning did not reach a successful connection.
    #[error("Provisioning failed: {reason}")]
    Provisioning { reason: String },

    // ── Mode ────────────────────────────────────────────────────────
    /// Operation needs a transport that is not available right now.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

impl Error {
    /// Returns `true` if this error indicates the device refused our secret.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::ConnectionFailed(_) | Self::WebSocketClosed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert!(Error::ConnectionFailed("refused".into()).is_transient());
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
        assert!(!Error::AuthenticationFailed { reason: "bad key".into() }.is_transient());
        assert!(!Error::UnsupportedOperation("send_config").is_transient());
    }

    #[test]
    fn classifies_auth_and_not_found() {
        assert!(Error::AuthenticationFailed { reason: "nope".into() }.is_auth_failure());
        assert!(Error::Http { status: 404, message: String::new() }.is_not_found());
        assert!(!Error::Http { status: 500, message: String::new() }.is_not_found());
    }
}
