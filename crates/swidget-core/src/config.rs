// ── Runtime device configuration ──
//
// Describes *how* to talk to one device: address, credentials, transport
// choices, and timing. Core never touches disk; the CLI (via
// swidget-config) builds a `DeviceConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;

use swidget_api::transport::{Credentials, DEFAULT_TOKEN_NAME, TlsMode, TransportConfig};
use swidget_api::websocket::{ReconnectConfig, SocketEndpoint};

/// Configuration for a single device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// IP address or hostname, optionally with `:port`.
    pub host: String,
    /// Header / query name carrying the secret.
    pub token_name: String,
    pub secret_key: SecretString,
    /// `https`/`wss` when true.
    pub use_https: bool,
    /// Verify the device certificate. Devices ship self-signed certs.
    pub verify_ssl: bool,
    /// Open the realtime socket. When false every call goes over HTTP.
    pub use_websockets: bool,
    /// Fixed delay between reconnect attempts.
    pub retry_interval: Duration,
    /// Reconnect attempts before falling back to HTTP. `None` = forever.
    pub max_retries: Option<u32>,
    /// Stop reconnecting after this many consecutive handshake rejections.
    pub auth_failure_limit: Option<u32>,
    /// How long a socket command waits for its response.
    pub command_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl DeviceConfig {
    /// Defaults for `host` with the standard token name.
    pub fn new(host: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            host: host.into(),
            secret_key,
            ..Self::default()
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.token_name.clone(), self.secret_key.clone())
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            use_https: self.use_https,
            tls: if self.verify_ssl {
                TlsMode::Verify
            } else {
                TlsMode::DangerAcceptInvalid
            },
            timeout: self.http_timeout,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectConfig {
        ReconnectConfig {
            retry_interval: self.retry_interval,
            max_retries: self.max_retries,
            auth_failure_limit: self.auth_failure_limit,
            handshake_timeout: self.handshake_timeout,
        }
    }

    pub fn socket_endpoint(&self) -> SocketEndpoint {
        SocketEndpoint::new(self.host.clone(), self.credentials(), self.transport())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            token_name: DEFAULT_TOKEN_NAME.into(),
            secret_key: SecretString::from(String::new()),
            use_https: true,
            verify_ssl: false,
            use_websockets: true,
            retry_interval: Duration::from_secs(30),
            max_retries: None,
            auth_failure_limit: None,
            command_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            http_timeout: Duration::from_secs(30),
        }
    }
}
