//! Authenticated device websocket with automatic reconnect.
//!
//! [`SocketSupervisor`] owns at most one live socket to a device. It opens
//! `/api/v1/sock`, runs the [`handshake`], then hands the socket to a single
//! session task. The task decodes every text frame and forwards it, in
//! receive order, as a [`SocketEvent`] on an unbounded channel. When the
//! socket drops the same task retries on a fixed interval until it
//! reconnects, gives up, or is closed.
//!
//! # Example
//!
//! ```rust,ignore
//! use swidget_api::websocket::{ReconnectConfig, SocketEndpoint, SocketSupervisor};
//!
//! let endpoint = SocketEndpoint::new("192.168.1.50", credentials, TransportConfig::default());
//! let (socket, mut events) = SocketSupervisor::new(endpoint, ReconnectConfig::default());
//! socket.connect().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod codec;
pub mod handshake;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::{Credentials, TransportConfig};

pub use codec::{CommandRequest, CorrelationId, Frame, NotificationKind, QueryKind, StateDelta};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// ── Endpoint ─────────────────────────────────────────────────────────

/// Where and how to open the device socket.
#[derive(Debug, Clone)]
pub struct SocketEndpoint {
    pub host: String,
    pub credentials: Credentials,
    pub transport: TransportConfig,
}

impl SocketEndpoint {
    pub fn new(host: impl Into<String>, credentials: Credentials, transport: TransportConfig) -> Self {
        Self {
            host: host.into(),
            credentials,
            transport,
        }
    }

    /// `{ws|wss}://{host}/api/v1/sock?{token_name}={secret}`
    pub fn url(&self) -> Result<Url, Error> {
        let mut url = Url::parse(&format!(
            "{}://{}/api/v1/sock",
            self.transport.ws_scheme(),
            self.host
        ))?;
        url.query_pairs_mut().append_pair(
            &self.credentials.token_name,
            self.credentials.secret_key.expose_secret(),
        );
        Ok(url)
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Fixed-interval reconnect policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay between attempts. Default: 30s.
    pub retry_interval: Duration,

    /// Reconnect attempts before giving up. `None` retries forever.
    pub max_retries: Option<u32>,

    /// Stop retrying after this many consecutive handshake rejections.
    /// `None` treats rejections like any other failure.
    pub auth_failure_limit: Option<u32>,

    /// Time allowed for the challenge/response exchange. Default: 10s.
    pub handshake_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(30),
            max_retries: None,
            auth_failure_limit: None,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

// ── Status & events ──────────────────────────────────────────────────

/// Lifecycle of the device socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// What the supervisor reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A decoded inbound frame.
    Frame(Frame),
    /// The socket opened as `generation` dropped; a reconnect may follow.
    Disconnected { generation: u64 },
    /// [`SocketSupervisor::close`] was called.
    Closed,
}

// ── SocketSupervisor ─────────────────────────────────────────────────

/// Handle to the supervised device socket. Cheap to clone.
#[derive(Clone)]
pub struct SocketSupervisor {
    inner: Arc<Inner>,
}

struct Writer {
    generation: u64,
    sink: WsSink,
}

/// A socket that passed the handshake, before its read half is handed to
/// the session task.
struct Established {
    generation: u64,
    source: WsSource,
}

/// Where a session task starts.
enum Start {
    Live(Established),
    Retry { auth_failures: u32 },
}

struct Inner {
    endpoint: SocketEndpoint,
    policy: ReconnectConfig,
    status: watch::Sender<ConnectionStatus>,
    events: mpsc::UnboundedSender<SocketEvent>,
    writer: Mutex<Option<Writer>>,
    /// Bumped every time a socket passes the handshake.
    generation: AtomicU64,
    /// Serializes connect / disconnect / close transitions.
    lifecycle: Mutex<()>,
    /// Parent of every session token. Replaced on `reconnect()` after a
    /// `close()`.
    epoch: Mutex<CancellationToken>,
    /// Token of the running session task, if any.
    session: Mutex<Option<CancellationToken>>,
    closed: AtomicBool,
}

impl SocketSupervisor {
    /// Create a disconnected supervisor and the receiver for its events.
    pub fn new(endpoint: SocketEndpoint, policy: ReconnectConfig) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let inner = Arc::new(Inner {
            endpoint,
            policy,
            status,
            events,
            writer: Mutex::new(None),
            generation: AtomicU64::new(0),
            lifecycle: Mutex::new(()),
            epoch: Mutex::new(CancellationToken::new()),
            session: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        (Self { inner }, rx)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Subscribe to status transitions.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Generation of the most recently authenticated socket. Zero before
    /// the first successful connect.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn host(&self) -> &str {
        &self.inner.endpoint.host
    }

    /// Open and authenticate the socket, then hand it to a session task
    /// that reads frames and reconnects when the socket drops.
    ///
    /// Returns immediately if already connected. On failure the error is
    /// returned and the session task retries in the background per the
    /// policy.
    pub async fn connect(&self) -> Result<(), Error> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionFailed("session is closed".into()));
        }
        let epoch = self.inner.epoch.lock().await.clone();
        match self.inner.connect_once(&epoch).await {
            Ok(None) => Ok(()),
            Ok(Some(established)) => {
                self.inner.spawn_session(Start::Live(established)).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(host = %self.inner.endpoint.host, error = %e, "WebSocket connect failed");
                let auth_failures = u32::from(e.is_auth_failure());
                self.inner.spawn_session(Start::Retry { auth_failures }).await;
                Err(e)
            }
        }
    }

    /// Reset the retry state and connect again. Also reopens a session that
    /// was closed.
    pub async fn reconnect(&self) -> Result<(), Error> {
        {
            let mut epoch = self.inner.epoch.lock().await;
            if epoch.is_cancelled() {
                *epoch = CancellationToken::new();
            }
        }
        if !self.is_connected() {
            if let Some(session) = self.inner.session.lock().await.take() {
                session.cancel();
            }
        }
        self.inner.closed.store(false, Ordering::Release);
        self.connect().await
    }

    /// Write one text frame to the live socket and return the generation of
    /// the socket it went out on.
    pub async fn send_text(&self, text: String) -> Result<u64, Error> {
        let mut writer = self.inner.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(Error::ConnectionFailed("socket is not connected".into()));
        };
        writer
            .sink
            .send(Message::text(text))
            .await
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
        Ok(writer.generation)
    }

    /// Stop retrying, close the socket, and emit [`SocketEvent::Closed`].
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        self.inner.epoch.lock().await.cancel();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _guard = self.inner.lifecycle.lock().await;
        self.inner.set_status(ConnectionStatus::Closing);
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            if let Err(e) = writer.sink.close().await {
                tracing::debug!(error = %e, "error while closing WebSocket");
            }
        }
        self.inner.set_status(ConnectionStatus::Disconnected);
        let _ = self.inner.events.send(SocketEvent::Closed);
        tracing::info!(host = %self.inner.endpoint.host, "WebSocket closed");
    }
}

impl Inner {
    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!(host = %self.endpoint.host, from = %previous, to = %status, "socket status");
        }
    }

    /// One connect + authenticate cycle, serialized with other transitions.
    /// `Ok(None)` means a socket is already live.
    async fn connect_once(&self, abort: &CancellationToken) -> Result<Option<Established>, Error> {
        let _guard = self.lifecycle.lock().await;
        if abort.is_cancelled() {
            return Err(Error::ConnectionFailed("connect cancelled".into()));
        }
        if *self.status.borrow() == ConnectionStatus::Connected {
            return Ok(None);
        }

        let result = tokio::select! {
            biased;
            () = abort.cancelled() => Err(Error::ConnectionFailed("connect cancelled".into())),
            result = self.establish() => result,
        };

        match result {
            Ok((sink, source)) => {
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                *self.writer.lock().await = Some(Writer { generation, sink });
                self.set_status(ConnectionStatus::Connected);
                tracing::info!(host = %self.endpoint.host, generation, "WebSocket connected");
                Ok(Some(Established { generation, source }))
            }
            Err(e) => {
                self.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(WsSink, WsSource), Error> {
        self.set_status(ConnectionStatus::Connecting);

        let url = self.endpoint.url()?;
        tracing::debug!(host = %self.endpoint.host, "opening WebSocket");
        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::ConnectionFailed(e.to_string()))?;

        let credentials = &self.endpoint.credentials;
        let request = ClientRequestBuilder::new(uri).with_header(
            credentials.token_name.clone(),
            credentials.secret_key.expose_secret().to_owned(),
        );
        let connector = self.endpoint.transport.websocket_connector()?;

        let timeout = self.endpoint.transport.timeout;
        let opened = tokio::time::timeout(
            timeout,
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector),
        )
        .await
        .map_err(|_| Error::Timeout {
            timeout_secs: timeout.as_secs(),
        })?;
        let (mut ws, _response) = opened.map_err(|e| match e {
            tungstenite::Error::Http(resp) if matches!(resp.status().as_u16(), 401 | 403) => {
                Error::AuthenticationFailed {
                    reason: format!("upgrade refused with HTTP {}", resp.status()),
                }
            }
            other => Error::ConnectionFailed(other.to_string()),
        })?;

        self.set_status(ConnectionStatus::Authenticating);
        handshake::authenticate(&mut ws, credentials, self.policy.handshake_timeout).await?;

        Ok(ws.split())
    }

    /// Replace the running session task with a fresh one.
    async fn spawn_session(self: &Arc<Self>, start: Start) {
        let token = self.epoch.lock().await.child_token();
        if token.is_cancelled() {
            return;
        }
        if let Some(previous) = self.session.lock().await.replace(token.clone()) {
            previous.cancel();
        }
        tokio::spawn(run_session(Arc::clone(self), token, start));
    }

    /// Drop the writer for `generation` and report the outage. Returns
    /// `false` when the supervisor was closed meanwhile.
    async fn mark_disconnected(&self, generation: u64) -> bool {
        let _guard = self.lifecycle.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut writer = self.writer.lock().await;
        if writer.as_ref().is_some_and(|w| w.generation == generation) {
            writer.take();
        }
        drop(writer);
        self.set_status(ConnectionStatus::Disconnected);
        let _ = self.events.send(SocketEvent::Disconnected { generation });
        true
    }
}

// ── Session task ─────────────────────────────────────────────────────

/// Connect → read → on drop, wait → reconnect, until cancelled or the
/// policy gives up. One per supervisor at a time.
async fn run_session(inner: Arc<Inner>, cancel: CancellationToken, start: Start) {
    let host = inner.endpoint.host.clone();
    let mut next = start;

    loop {
        let established = match next {
            Start::Live(established) => established,
            Start::Retry { auth_failures } => match retry(&inner, &cancel, auth_failures).await {
                Some(established) => established,
                None => break,
            },
        };

        let generation = established.generation;
        read_frames(&inner, established.source, &cancel).await;
        if cancel.is_cancelled() || !inner.mark_disconnected(generation).await {
            break;
        }
        tracing::info!(host = %host, generation, "WebSocket dropped, reconnecting");
        next = Start::Retry { auth_failures: 0 };
    }

    tracing::debug!(host = %host, "WebSocket session exiting");
}

/// Read frames until the socket drops or `cancel` fires.
async fn read_frames(inner: &Inner, mut source: WsSource, cancel: &CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match codec::decode(text.as_str()) {
                        Ok(frame) => {
                            let _ = inner.events.send(SocketEvent::Frame(frame));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping malformed frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason.as_str(), "WebSocket close frame received");
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        return;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary; tungstenite answers pings itself.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read error");
                        return;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return;
                    }
                }
            }
        }
    }
}

/// Fixed-interval reconnect for one outage. Attempts are counted from zero
/// each time it is entered.
async fn retry(inner: &Inner, cancel: &CancellationToken, mut auth_failures: u32) -> Option<Established> {
    let policy = &inner.policy;
    let host = &inner.endpoint.host;
    let mut attempt: u32 = 0;

    loop {
        if let Some(limit) = policy.auth_failure_limit {
            if auth_failures >= limit {
                tracing::error!(host = %host, auth_failures, "device keeps rejecting the secret key, giving up");
                return None;
            }
        }
        if let Some(max) = policy.max_retries {
            if attempt >= max {
                tracing::error!(host = %host, max_retries = max, "WebSocket reconnection limit reached, giving up");
                return None;
            }
        }

        tracing::info!(
            host = %host,
            delay_ms = u64::try_from(policy.retry_interval.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(policy.retry_interval) => {}
        }
        attempt += 1;

        match inner.connect_once(cancel).await {
            Ok(Some(established)) => {
                tracing::info!(host = %host, attempt, "WebSocket reconnected");
                return Some(established);
            }
            // Someone else connected; that caller owns the new socket.
            Ok(None) => return None,
            Err(_) if cancel.is_cancelled() => return None,
            Err(e) => {
                tracing::warn!(host = %host, error = %e, attempt, "reconnect attempt failed");
                if e.is_auth_failure() {
                    auth_failures += 1;
                } else {
                    auth_failures = 0;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn endpoint(use_https: bool) -> SocketEndpoint {
        SocketEndpoint::new(
            "192.168.1.50",
            Credentials::new("x-secret-key", SecretString::from("abc def".to_string())),
            TransportConfig {
                use_https,
                ..TransportConfig::default()
            },
        )
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.retry_interval, Duration::from_secs(30));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert!(config.max_retries.is_none());
        assert!(config.auth_failure_limit.is_none());
    }

    #[test]
    fn socket_url_carries_token_query() {
        assert_eq!(
            endpoint(true).url().expect("url").as_str(),
            "wss://192.168.1.50/api/v1/sock?x-secret-key=abc+def"
        );
        assert!(endpoint(false).url().expect("url").as_str().starts_with("ws://"));
    }

    #[tokio::test]
    async fn new_supervisor_is_disconnected() {
        let (socket, _events) = SocketSupervisor::new(endpoint(false), ReconnectConfig::default());
        assert_eq!(socket.status(), ConnectionStatus::Disconnected);
        assert!(!socket.is_connected());
        assert!(socket.send_text("{}".into()).await.is_err());
    }

    #[tokio::test]
    async fn close_twice_emits_one_closed_event() {
        let (socket, mut events) = SocketSupervisor::new(endpoint(false), ReconnectConfig::default());
        socket.close().await;
        socket.close().await;
        assert_eq!(events.recv().await, Some(SocketEvent::Closed));
        assert!(events.try_recv().is_err());
        assert_eq!(socket.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn connect_after_close_is_refused() {
        let (socket, _events) = SocketSupervisor::new(endpoint(false), ReconnectConfig::default());
        socket.close().await;
        assert!(matches!(socket.connect().await, Err(Error::ConnectionFailed(_))));
    }
}
