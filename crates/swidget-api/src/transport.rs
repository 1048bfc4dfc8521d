// Shared transport configuration for the HTTP client and the websocket.
//
// Both transports share the scheme choice, TLS verification mode, and
// request timeout through this module, avoiding duplicated builder logic.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::Connector;

use crate::error::Error;

/// Header name used when the caller does not supply one.
pub const DEFAULT_TOKEN_NAME: &str = "x-secret-key";

/// TLS verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify the device certificate against the webpki root store.
    Verify,
    /// Accept any certificate. Swidget devices ship self-signed certs.
    DangerAcceptInvalid,
}

/// Authentication material shared by both transports.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Header / query name the device expects, usually `x-secret-key`.
    pub token_name: String,
    pub secret_key: SecretString,
}

impl Credentials {
    pub fn new(token_name: impl Into<String>, secret_key: SecretString) -> Self {
        let token_name = token_name.into();
        let token_name = if token_name.is_empty() {
            DEFAULT_TOKEN_NAME.to_owned()
        } else {
            token_name
        };
        Self { token_name, secret_key }
    }

    /// The auth header carried by every HTTP request and the websocket upgrade.
    pub fn header(&self) -> Result<(HeaderName, HeaderValue), Error> {
        let name = HeaderName::from_bytes(self.token_name.as_bytes()).map_err(|e| {
            Error::AuthenticationFailed {
                reason: format!("invalid token name '{}': {e}", self.token_name),
            }
        })?;
        let mut value = HeaderValue::from_str(self.secret_key.expose_secret()).map_err(|e| {
            Error::AuthenticationFailed {
                reason: format!("secret key is not a valid header value: {e}"),
            }
        })?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

/// Shared transport configuration for building clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// `https`/`wss` when true, `http`/`ws` otherwise.
    pub use_https: bool,
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            use_https: true,
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    pub fn http_scheme(&self) -> &'static str {
        if self.use_https { "https" } else { "http" }
    }

    pub fn ws_scheme(&self) -> &'static str {
        if self.use_https { "wss" } else { "ws" }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Build a `reqwest::Client` with additional default headers.
    ///
    /// Used by [`HttpClient`](crate::http::HttpClient) to inject the
    /// device's secret-key header on every request.
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("swidget/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);

        if self.tls == TlsMode::DangerAcceptInvalid {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// TLS connector for the websocket upgrade.
    ///
    /// `None` lets tokio-tungstenite pick its default (verified) rustls
    /// config, which is also what plain `ws://` needs.
    pub fn websocket_connector(&self) -> Result<Option<Connector>, Error> {
        if !self.use_https || self.tls == TlsMode::Verify {
            return Ok(None);
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(format!("unsupported TLS protocol set: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
            .with_no_client_auth();

        Ok(Some(Connector::Rustls(Arc::new(config))))
    }
}

// ── Self-signed certificate support ─────────────────────────────────

/// Certificate verifier that accepts whatever the device presents.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
