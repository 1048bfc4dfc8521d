// Device HTTP API client
//
// Wraps `reqwest::Client` with the device base URL, the secret-key header,
// and status/JSON handling. Every endpoint the device exposes over HTTP is
// an inherent method here; the websocket dispatch layer falls back to
// `send_command` when no socket is live.

use bytes::Bytes;
use reqwest::Method;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{NameResponse, SummaryResponse, UpdatesResponse};
use crate::transport::{Credentials, TransportConfig};

/// HTTP client for a single Swidget device.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl HttpClient {
    /// Create a client for `host` (an IP address or hostname, optionally with
    /// a port). The secret-key header is attached to every request.
    pub fn new(host: &str, credentials: Credentials, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("{}://{host}", transport.http_scheme()))?;
        credentials.header()?;
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Create a client with a pre-built `reqwest::Client` and explicit base URL.
    ///
    /// The auth header is still added per request, so the supplied client
    /// does not need default headers.
    pub fn with_client(http: reqwest::Client, base_url: Url, credentials: Credentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    /// The device base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Generic request ──────────────────────────────────────────────

    /// Issue `method path` with an optional JSON body and return the parsed
    /// JSON response. An empty body parses as `null`.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, Error> {
        let resp = self.send(method, path, body).await?;
        parse_json(resp).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<reqwest::Response, Error> {
        let url = self.url(path)?;
        debug!("{method} {url}");

        let (name, value) = self.credentials.header()?;
        let mut req = self.http.request(method, url).header(name, value);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(Error::Transport)?;
        check_status(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let value = self.request(Method::GET, path, None).await?;
        decode(value)
    }

    // ── Device state ─────────────────────────────────────────────────

    /// `GET /api/v1/summary`: model, MAC, firmware, assemblies.
    pub async fn get_summary(&self) -> Result<SummaryResponse, Error> {
        self.get("/api/v1/summary").await
    }

    /// `GET /api/v1/state`: current function values per assembly/component.
    pub async fn get_state(&self) -> Result<Value, Error> {
        self.request(Method::GET, "/api/v1/state", None).await
    }

    /// `GET /api/v1/name`
    pub async fn get_name(&self) -> Result<String, Error> {
        let name: NameResponse = self.get("/api/v1/name").await?;
        Ok(name.name)
    }

    /// `GET /api/v1/device_config`
    pub async fn get_device_config(&self) -> Result<Value, Error> {
        self.request(Method::GET, "/api/v1/device_config", None).await
    }

    /// `POST /api/v1/command` with a nested command document. Returns the
    /// device state the device reports after applying it.
    pub async fn send_command(&self, document: &Value) -> Result<Value, Error> {
        self.request(Method::POST, "/api/v1/command", Some(document)).await
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// `GET /ping`. Any transport failure counts as "not reachable".
    pub async fn ping(&self) -> bool {
        match self.send(Method::GET, "/ping", None).await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "ping failed");
                false
            }
        }
    }

    /// `GET /blink`: flash the device LED.
    pub async fn blink(&self) -> Result<Value, Error> {
        self.request(Method::GET, "/blink", None).await
    }

    /// `POST /api/v1/reset`: reboot.
    pub async fn restart_device(&self) -> Result<Value, Error> {
        self.request(Method::POST, "/api/v1/reset", None).await
    }

    /// `DELETE /api/v1/reset`: wipe the device back to factory settings.
    pub async fn factory_reset(&self) -> Result<Value, Error> {
        self.request(Method::DELETE, "/api/v1/reset", None).await
    }

    /// `GET /api/v1/update`: available firmware versions, sorted.
    pub async fn check_for_updates(&self) -> Result<Vec<String>, Error> {
        let mut updates: UpdatesResponse = self.get("/api/v1/update").await?;
        updates.updates.sort();
        Ok(updates.updates)
    }

    /// `POST /api/v1/update/version`: download and apply `version`.
    pub async fn update_version(&self, version: &str) -> Result<bool, Error> {
        let body = serde_json::json!({ "version": version });
        let resp = self.send(Method::POST, "/api/v1/update/version", Some(&body)).await?;
        Ok(resp.status() == reqwest::StatusCode::OK)
    }

    /// `GET /debug?{token_name}={secret}`: turn on the local debug server.
    pub async fn enable_debug_server(&self) -> Result<bool, Error> {
        let mut url = self.url("/debug")?;
        url.query_pairs_mut().append_pair(
            &self.credentials.token_name,
            self.credentials.secret_key.expose_secret(),
        );
        debug!("GET {}/debug", self.base_url);

        let (name, value) = self.credentials.header()?;
        let resp = self
            .http
            .get(url)
            .header(name, value)
            .send()
            .await
            .map_err(Error::Transport)?;
        Ok(resp.status() == reqwest::StatusCode::OK)
    }

    /// `GET /api/v1/picture`: JPEG snapshot from a video insert. Returns
    /// `None` if the device answers with anything other than 200.
    pub async fn get_picture(&self, size: Option<(u32, u32)>) -> Result<Option<Bytes>, Error> {
        let url = self.url("/api/v1/picture")?;
        debug!("GET {url}");

        let (name, value) = self.credentials.header()?;
        let mut req = self.http.get(url).header(name, value);
        if let Some((width, height)) = size {
            req = req
                .header("x-picture-width", width.to_string())
                .header("x-picture-height", height.to_string());
        }

        let resp = req.send().await.map_err(Error::Transport)?;
        if resp.status() != reqwest::StatusCode::OK {
            return Ok(None);
        }
        Ok(Some(resp.bytes().await.map_err(Error::Transport)?))
    }
}

// ── Response helpers ─────────────────────────────────────────────────

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::AuthenticationFailed {
            reason: format!("device rejected secret key (HTTP {status})"),
        });
    }

    Err(Error::Http {
        status: status.as_u16(),
        message: body,
    })
}

async fn parse_json(resp: reqwest::Response) -> Result<Value, Error> {
    let body = resp.text().await.map_err(Error::Transport)?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}
