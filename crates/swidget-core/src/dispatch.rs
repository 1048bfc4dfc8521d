// ── Command dispatch ──
//
// Routes commands and queries to the live socket when there is one and to
// the HTTP API otherwise. Socket commands are matched to their responses by
// correlation id through the pending table. Every result document is merged
// into the state store before it is returned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use swidget_api::HttpClient;
use swidget_api::websocket::codec::{self, CommandRequest, CorrelationId, QueryKind};
use swidget_api::websocket::{Frame, SocketEvent, SocketSupervisor, StateDelta};

use crate::convert::summary_from_value;
use crate::error::CoreError;
use crate::model::Summary;
use crate::store::StateStore;

type Slot = oneshot::Sender<Result<Value, CoreError>>;

struct PendingCommand {
    issued: Instant,
    /// Socket generation the frame went out on.
    generation: u64,
    slot: Slot,
}

/// Sends commands over whichever transport is available and folds the
/// results into the cached state.
pub struct Dispatcher {
    http: HttpClient,
    socket: Option<SocketSupervisor>,
    store: Arc<StateStore>,
    pending: Mutex<HashMap<CorrelationId, PendingCommand>>,
    next_id: AtomicU64,
    command_timeout: Duration,
    notifications: mpsc::UnboundedSender<Arc<StateDelta>>,
}

impl Dispatcher {
    pub fn new(
        http: HttpClient,
        socket: Option<SocketSupervisor>,
        store: Arc<StateStore>,
        command_timeout: Duration,
        notifications: mpsc::UnboundedSender<Arc<StateDelta>>,
    ) -> Self {
        Self {
            http,
            socket,
            store,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            command_timeout,
            notifications,
        }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn socket(&self) -> Option<&SocketSupervisor> {
        self.socket.as_ref()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn live_socket(&self) -> Option<&SocketSupervisor> {
        self.socket.as_ref().filter(|s| s.is_connected())
    }

    /// Commands still waiting for a response.
    pub fn outstanding(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<CorrelationId, PendingCommand>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Invoke one function on one component and return the device's
    /// resulting state document.
    pub async fn send_command(
        &self,
        assembly: &str,
        component: &str,
        function: &str,
        payload: Value,
    ) -> Result<Value, CoreError> {
        let command = CommandRequest::new(assembly, component, function, payload);

        let result = match self.live_socket() {
            Some(socket) => {
                let id = self.next_correlation_id();
                let frame = codec::encode_command(id, &command);
                match self.round_trip(socket, id, frame).await {
                    Err(CoreError::ConnectionFailed { reason, .. }) => {
                        debug!(correlation_id = id, %reason, "socket write failed, using HTTP");
                        self.http.send_command(&command.to_document()).await?
                    }
                    other => other?,
                }
            }
            None => {
                debug!(assembly, component, function, "no live socket, using HTTP");
                self.http.send_command(&command.to_document()).await?
            }
        };

        self.store.apply_state(&result);
        Ok(result)
    }

    /// Push a configuration change. Only possible over the socket.
    pub async fn send_config(&self, payload: Value) -> Result<Value, CoreError> {
        let Some(socket) = self.live_socket() else {
            return Err(CoreError::unsupported(
                "send_config",
                "configuration can only be pushed over a live websocket",
            ));
        };
        let id = self.next_correlation_id();
        let frame = codec::encode_config(id, &payload);
        let result = self.round_trip(socket, id, frame).await?;
        self.store.update_configuration(&payload);
        Ok(result)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn refresh_summary(&self) -> Result<Summary, CoreError> {
        let summary = match self.live_socket() {
            Some(socket) => {
                let document = self.query(socket, QueryKind::Summary).await?;
                summary_from_value(&document).ok_or_else(|| CoreError::MalformedFrame {
                    reason: "summary response did not match the expected shape".into(),
                })?
            }
            None => self.http.get_summary().await?.into(),
        };
        self.store.apply_summary(&summary);
        Ok(summary)
    }

    pub async fn refresh_state(&self) -> Result<Value, CoreError> {
        let document = match self.live_socket() {
            Some(socket) => self.query(socket, QueryKind::State).await?,
            None => self.http.get_state().await?,
        };
        self.store.apply_state(&document);
        Ok(document)
    }

    async fn query(&self, socket: &SocketSupervisor, kind: QueryKind) -> Result<Value, CoreError> {
        let id = self.next_correlation_id();
        self.round_trip(socket, id, codec::encode_query(id, kind)).await
    }

    // ── Correlation ──────────────────────────────────────────────────

    fn next_correlation_id(&self) -> CorrelationId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `id`, write `frame`, and wait for the matching response.
    async fn round_trip(&self, socket: &SocketSupervisor, id: CorrelationId, frame: String) -> Result<Value, CoreError> {
        let (slot, rx) = oneshot::channel();
        let generation = socket.generation();
        self.lock_pending().insert(
            id,
            PendingCommand {
                issued: Instant::now(),
                generation,
                slot,
            },
        );

        match socket.send_text(frame).await {
            Ok(sent_on) if sent_on != generation => {
                if let Some(entry) = self.lock_pending().get_mut(&id) {
                    entry.generation = sent_on;
                }
            }
            Ok(_) => {}
            Err(e) => {
                self.lock_pending().remove(&id);
                return Err(CoreError::ConnectionFailed {
                    host: socket.host().to_owned(),
                    reason: e.to_string(),
                });
            }
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::ConnectionClosed),
            Err(_) => {
                self.lock_pending().remove(&id);
                warn!(correlation_id = id, "command timed out");
                Err(CoreError::CommandTimeout {
                    correlation_id: id,
                    timeout_ms: u64::try_from(self.command_timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    fn resolve(&self, id: CorrelationId, result: Result<Value, CoreError>) {
        let Some(entry) = self.lock_pending().remove(&id) else {
            debug!(correlation_id = id, "dropping response for unknown command");
            return;
        };
        debug!(
            correlation_id = id,
            elapsed_ms = u64::try_from(entry.issued.elapsed().as_millis()).unwrap_or(u64::MAX),
            "command answered"
        );
        // The caller may have given up already.
        let _ = entry.slot.send(result);
    }

    /// Resolve every outstanding command with `ConnectionClosed`.
    pub fn fail_all(&self) {
        let drained: Vec<_> = self.lock_pending().drain().map(|(_, entry)| entry).collect();
        Self::fail(drained);
    }

    /// Resolve commands written to socket `generation` or an older one.
    /// Commands already sent on a newer socket keep waiting.
    fn fail_through(&self, generation: u64) {
        let drained: Vec<_> = {
            let mut pending = self.lock_pending();
            let stale: Vec<CorrelationId> = pending
                .iter()
                .filter(|(_, entry)| entry.generation <= generation)
                .map(|(id, _)| *id)
                .collect();
            stale.iter().filter_map(|id| pending.remove(id)).collect()
        };
        Self::fail(drained);
    }

    fn fail(drained: Vec<PendingCommand>) {
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing outstanding commands");
        }
        for entry in drained {
            let _ = entry.slot.send(Err(CoreError::ConnectionClosed));
        }
    }

    // ── Inbound events ───────────────────────────────────────────────

    /// Route one supervisor event. Called from the event pump.
    pub fn handle_event(&self, event: SocketEvent) {
        match event {
            SocketEvent::Frame(Frame::Response { correlation_id, result }) => {
                let result = result.map_err(|message| CoreError::Rejected { message });
                self.resolve(correlation_id, result);
            }
            SocketEvent::Frame(Frame::Notification(delta)) => {
                self.store.apply_delta(&delta);
                if self.notifications.send(Arc::new(delta)).is_err() {
                    debug!("notification delivery task has stopped");
                }
            }
            SocketEvent::Frame(Frame::Error { reason }) => {
                warn!(%reason, "device reported an error frame");
            }
            SocketEvent::Disconnected { generation } => self.fail_through(generation),
            SocketEvent::Closed => self.fail_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use swidget_api::Credentials;
    use swidget_api::websocket::NotificationKind;
    use url::Url;

    use super::*;

    fn dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<Arc<StateDelta>>) {
        let http = HttpClient::with_client(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9").expect("url"),
            Credentials::new("x-secret-key", SecretString::from("k".to_string())),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(http, None, Arc::new(StateStore::new()), Duration::from_secs(5), tx);
        (dispatcher, rx)
    }

    fn register(dispatcher: &Dispatcher, id: CorrelationId) -> oneshot::Receiver<Result<Value, CoreError>> {
        register_on(dispatcher, id, 1)
    }

    fn register_on(
        dispatcher: &Dispatcher,
        id: CorrelationId,
        generation: u64,
    ) -> oneshot::Receiver<Result<Value, CoreError>> {
        let (slot, rx) = oneshot::channel();
        dispatcher.lock_pending().insert(
            id,
            PendingCommand {
                issued: Instant::now(),
                generation,
                slot,
            },
        );
        rx
    }

    #[tokio::test]
    async fn response_resolves_matching_entry_once() {
        let (dispatcher, _rx) = dispatcher();
        let waiter = register(&dispatcher, 7);

        dispatcher.handle_event(SocketEvent::Frame(Frame::Response {
            correlation_id: 7,
            result: Ok(json!({ "ok": true })),
        }));
        // A duplicate reply and a reply nobody asked for are both dropped.
        dispatcher.handle_event(SocketEvent::Frame(Frame::Response {
            correlation_id: 7,
            result: Ok(json!({ "ok": false })),
        }));
        dispatcher.handle_event(SocketEvent::Frame(Frame::Response {
            correlation_id: 8,
            result: Ok(json!({ "ok": false })),
        }));

        let value = waiter.await.expect("resolved").expect("ok");
        assert_eq!(value, json!({ "ok": true }));
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[tokio::test]
    async fn error_response_is_rejected() {
        let (dispatcher, _rx) = dispatcher();
        let waiter = register(&dispatcher, 3);
        dispatcher.handle_event(SocketEvent::Frame(Frame::Response {
            correlation_id: 3,
            result: Err("bad function".into()),
        }));
        let err = waiter.await.expect("resolved").expect_err("rejected");
        assert!(matches!(err, CoreError::Rejected { ref message } if message == "bad function"));
    }

    #[tokio::test]
    async fn disconnect_fails_everything() {
        let (dispatcher, _rx) = dispatcher();
        let a = register(&dispatcher, 1);
        let b = register(&dispatcher, 2);

        dispatcher.handle_event(SocketEvent::Disconnected { generation: 1 });

        assert!(matches!(a.await.expect("resolved"), Err(CoreError::ConnectionClosed)));
        assert!(matches!(b.await.expect("resolved"), Err(CoreError::ConnectionClosed)));
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[tokio::test]
    async fn late_disconnect_spares_commands_on_the_new_socket() {
        let (dispatcher, _rx) = dispatcher();
        let old = register_on(&dispatcher, 1, 1);
        let mut new = register_on(&dispatcher, 2, 2);

        // The drop of socket 1 is handled after socket 2 is already in use.
        dispatcher.handle_event(SocketEvent::Disconnected { generation: 1 });

        assert!(matches!(old.await.expect("resolved"), Err(CoreError::ConnectionClosed)));
        assert!(new.try_recv().is_err());
        assert_eq!(dispatcher.outstanding(), 1);

        dispatcher.handle_event(SocketEvent::Frame(Frame::Response {
            correlation_id: 2,
            result: Ok(json!({ "ok": true })),
        }));
        assert_eq!(new.await.expect("resolved").expect("ok"), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn close_fails_every_generation() {
        let (dispatcher, _rx) = dispatcher();
        let a = register_on(&dispatcher, 1, 1);
        let b = register_on(&dispatcher, 2, 5);

        dispatcher.handle_event(SocketEvent::Closed);

        assert!(matches!(a.await.expect("resolved"), Err(CoreError::ConnectionClosed)));
        assert!(matches!(b.await.expect("resolved"), Err(CoreError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn notification_is_merged_then_delivered() {
        let (dispatcher, mut rx) = dispatcher();
        let body = json!({ "connection": { "rssi": -61 } });
        dispatcher.handle_event(SocketEvent::Frame(Frame::Notification(StateDelta {
            kind: NotificationKind::DynamicUpdate,
            body: body.clone(),
        })));

        assert_eq!(dispatcher.store().snapshot().rssi, Some(-61));
        let delivered = rx.recv().await.expect("delivered");
        assert_eq!(delivered.body, body);
    }

    #[tokio::test]
    async fn config_needs_a_socket() {
        let (dispatcher, _rx) = dispatcher();
        let err = dispatcher
            .send_config(json!({ "led.brightness": 5 }))
            .await
            .expect_err("no socket");
        assert!(matches!(err, CoreError::UnsupportedOperation { .. }));
    }
}
