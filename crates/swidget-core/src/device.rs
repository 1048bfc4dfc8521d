// ── Device handle ──
//
// Full lifecycle management for one Swidget device: socket supervision,
// background event pump, subscriber delivery, and the user-facing
// operations. Reads come from the state store; writes go through the
// dispatcher.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use swidget_api::HttpClient;
use swidget_api::websocket::{ConnectionStatus, SocketEvent, SocketSupervisor, StateDelta};

use crate::capability::{Dimmer, TimerSwitch};
use crate::config::DeviceConfig;
use crate::dispatch::Dispatcher;
use crate::error::CoreError;
use crate::model::{DeviceState, DeviceType, HOST, HwInfo, INSERT, InsertType, Summary};
use crate::store::StateStore;
use crate::subscriber::Subscriber;

/// `update()` calls closer together than this are skipped.
pub const UPDATE_THROTTLE: Duration = Duration::from_secs(5);

/// Name reported until the device has told us its own.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Swidget Device";

/// Port the video insert serves RTSP on.
const RTSP_PORT: u16 = 8554;

/// Default RTSP stream encoding.
pub const DEFAULT_STREAM_ENCODING: &str = "ph264";

// ── Device ───────────────────────────────────────────────────────────

/// Handle to one device on the local network.
///
/// Cheaply cloneable via `Arc<DeviceInner>`. Create with
/// [`new`](Self::new), then call [`start`](Self::start) to open the
/// socket and load the initial state.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    config: DeviceConfig,
    dispatcher: Arc<Dispatcher>,
    subscriber: Arc<ArcSwap<Subscriber>>,
    /// Status for HTTP-only devices, which never leave `Disconnected`.
    idle_status: watch::Sender<ConnectionStatus>,
    socket_events: Mutex<Option<mpsc::UnboundedReceiver<SocketEvent>>>,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<Arc<StateDelta>>>>,
    last_update: Mutex<Option<Instant>>,
    cancel: CancellationToken,
    closed: AtomicBool,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Device {
    /// Build a device handle. Nothing touches the network until
    /// [`start`](Self::start), [`connect`](Self::connect) or a command.
    pub fn new(config: DeviceConfig) -> Result<Self, CoreError> {
        let http = HttpClient::new(&config.host, config.credentials(), &config.transport())?;
        Ok(Self::with_http(config, http))
    }

    /// Build a device handle around an existing HTTP client.
    pub fn with_http(config: DeviceConfig, http: HttpClient) -> Self {
        let (socket, socket_events) = if config.use_websockets {
            let (socket, events) = SocketSupervisor::new(config.socket_endpoint(), config.reconnect_policy());
            (Some(socket), Some(events))
        } else {
            (None, None)
        };

        let store = Arc::new(StateStore::new());
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(
            http,
            socket,
            store,
            config.command_timeout,
            notify_tx,
        ));
        let (idle_status, _) = watch::channel(ConnectionStatus::Disconnected);

        Self {
            inner: Arc::new(DeviceInner {
                config,
                dispatcher,
                subscriber: Arc::new(ArcSwap::from_pointee(Subscriber::None)),
                idle_status,
                socket_events: Mutex::new(socket_events),
                notifications: Mutex::new(Some(notify_rx)),
                last_update: Mutex::new(None),
                cancel: CancellationToken::new(),
                closed: AtomicBool::new(false),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    fn socket(&self) -> Option<&SocketSupervisor> {
        self.inner.dispatcher.socket()
    }

    fn http(&self) -> &HttpClient {
        self.inner.dispatcher.http()
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CoreError::ConnectionClosed);
        }
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the socket (when enabled) and load the initial state.
    ///
    /// A socket that cannot be opened is not an error here: the
    /// supervisor keeps retrying in the background and commands use HTTP
    /// meanwhile.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.ensure_open()?;
        self.spawn_background_tasks().await;

        if let Some(socket) = self.socket() {
            if !socket.is_connected() {
                if let Err(e) = socket.connect().await {
                    warn!(host = %self.host(), error = %e, "socket unavailable, using HTTP until it reconnects");
                }
            }
        }

        self.update().await?;
        info!(host = %self.host(), "device started");
        Ok(())
    }

    /// Open and authenticate the socket, surfacing any failure.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.ensure_open()?;
        let socket = self.require_socket("connect")?;
        self.spawn_background_tasks().await;
        socket.connect().await.map_err(CoreError::from)
    }

    /// Reset the retry state and open the socket again.
    pub async fn reconnect(&self) -> Result<(), CoreError> {
        self.ensure_open()?;
        let socket = self.require_socket("reconnect")?;
        self.spawn_background_tasks().await;
        socket.reconnect().await.map_err(CoreError::from)
    }

    /// Close the socket, resolve outstanding commands with
    /// `ConnectionClosed`, and stop background tasks. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(socket) = self.socket() {
            socket.close().await;
        }
        self.inner.dispatcher.fail_all();
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!(host = %self.host(), "device closed");
    }

    /// One-shot: load state over HTTP, run `f`, close.
    ///
    /// Skips the socket since only a single request/response cycle is
    /// needed.
    pub async fn oneshot<F, Fut, T>(config: DeviceConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Device) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut config = config;
        config.use_websockets = false;

        let device = Device::new(config)?;
        device.start().await?;
        let result = f(device.clone()).await;
        device.close().await;
        result
    }

    fn require_socket(&self, operation: &str) -> Result<&SocketSupervisor, CoreError> {
        self.socket()
            .ok_or_else(|| CoreError::unsupported(operation, "websockets are disabled for this device"))
    }

    /// Spawn the event pump and subscriber delivery task, once.
    async fn spawn_background_tasks(&self) {
        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.socket_events.lock().await.take() {
            let dispatcher = Arc::clone(&self.inner.dispatcher);
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(event_pump_task(dispatcher, rx, cancel)));
        }

        if let Some(rx) = self.inner.notifications.lock().await.take() {
            let subscriber = Arc::clone(&self.inner.subscriber);
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(delivery_task(subscriber, rx, cancel)));
        }
    }

    // ── State refresh ────────────────────────────────────────────────

    /// Refresh the cached state.
    ///
    /// The first call also fetches the friendly name and the device
    /// configuration. Later calls within [`UPDATE_THROTTLE`] of the last
    /// one do nothing.
    pub async fn update(&self) -> Result<(), CoreError> {
        self.ensure_open()?;
        let mut last_update = self.inner.last_update.lock().await;

        if let Some(at) = *last_update {
            if at.elapsed() < UPDATE_THROTTLE {
                debug!(host = %self.host(), "update recently called, skipping");
                return Ok(());
            }
        }
        let initial = last_update.is_none();

        let dispatcher = &self.inner.dispatcher;
        dispatcher.refresh_summary().await?;
        dispatcher.refresh_state().await?;

        if initial {
            self.load_friendly_name().await;
            self.load_device_config().await;
        }

        *last_update = Some(Instant::now());
        Ok(())
    }

    /// Fetch the summary and merge it into the cached state.
    pub async fn refresh_summary(&self) -> Result<Summary, CoreError> {
        self.ensure_open()?;
        self.inner.dispatcher.refresh_summary().await
    }

    async fn load_friendly_name(&self) {
        let name = match self.http().get_name().await {
            Ok(name) => name,
            Err(e) => {
                let state = self.snapshot();
                debug!(error = %e, "name lookup failed, deriving one");
                format!("Swidget {} w/{} insert", state.device_type, state.insert_type)
            }
        };
        self.store().set_friendly_name(&name);
    }

    async fn load_device_config(&self) {
        match self.http().get_device_config().await {
            Ok(document) => self.store().set_configuration(&document),
            Err(e) => warn!(host = %self.host(), error = %e, "could not fetch device configuration"),
        }
    }

    // ── Subscription & status ────────────────────────────────────────

    /// Replace the notification subscriber.
    pub fn subscribe(&self, subscriber: Subscriber) {
        self.inner.subscriber.store(Arc::new(subscriber));
    }

    pub fn unsubscribe(&self) {
        self.subscribe(Subscriber::None);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.socket()
            .map_or(ConnectionStatus::Disconnected, SocketSupervisor::status)
    }

    /// Subscribe to socket status transitions.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.socket()
            .map_or_else(|| self.inner.idle_status.subscribe(), SocketSupervisor::watch_status)
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    // ── Cached state ─────────────────────────────────────────────────

    pub fn store(&self) -> &StateStore {
        self.inner.dispatcher.store()
    }

    /// Current cached state. Never blocks on I/O.
    pub fn snapshot(&self) -> Arc<DeviceState> {
        self.store().snapshot()
    }

    pub fn friendly_name(&self) -> String {
        self.snapshot()
            .friendly_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_owned())
    }

    pub fn device_type(&self) -> DeviceType {
        self.snapshot().device_type
    }

    pub fn insert_type(&self) -> InsertType {
        self.snapshot().insert_type
    }

    pub fn is_on(&self) -> bool {
        self.snapshot().is_on()
    }

    pub fn usb_is_on(&self) -> bool {
        self.snapshot().usb_is_on()
    }

    pub fn hw_info(&self) -> HwInfo {
        HwInfo::from(self.snapshot().as_ref())
    }

    pub fn host_features(&self) -> Vec<String> {
        self.snapshot().host_features()
    }

    pub fn insert_features(&self) -> Vec<String> {
        self.snapshot().insert_features()
    }

    /// Every readable insert value, keyed by component.
    pub fn realtime_values(&self) -> BTreeMap<String, Value> {
        self.snapshot().realtime_values()
    }

    pub fn get_sensor_value(&self, component: &str, sensor: &str) -> Option<Value> {
        self.snapshot().sensor_value(component, sensor).cloned()
    }

    /// Power draw of one outlet plug.
    pub fn get_child_consumption(&self, plug: &str) -> Option<f64> {
        self.snapshot().child_consumption(plug)
    }

    pub fn total_consumption(&self) -> Option<f64> {
        self.snapshot().total_consumption()
    }

    pub fn available_stream_types(&self) -> Vec<String> {
        self.snapshot().available_stream_types()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Invoke one function on one component. Uses the socket when it is
    /// live and HTTP otherwise.
    pub async fn send_command(
        &self,
        assembly: &str,
        component: &str,
        function: &str,
        payload: Value,
    ) -> Result<Value, CoreError> {
        self.ensure_open()?;
        self.inner
            .dispatcher
            .send_command(assembly, component, function, payload)
            .await
    }

    /// Push configuration changes (dotted keys). Socket only.
    pub async fn send_config(&self, payload: Value) -> Result<Value, CoreError> {
        self.ensure_open()?;
        self.inner.dispatcher.send_config(payload).await
    }

    async fn toggle(&self, assembly: &str, component: &str, on: bool) -> Result<(), CoreError> {
        let state = if on { "on" } else { "off" };
        self.send_command(assembly, component, "toggle", json!({ "state": state }))
            .await?;
        Ok(())
    }

    pub async fn turn_on(&self) -> Result<(), CoreError> {
        self.toggle(HOST, "0", true).await
    }

    pub async fn turn_off(&self) -> Result<(), CoreError> {
        self.toggle(HOST, "0", false).await
    }

    pub async fn turn_on_usb_insert(&self) -> Result<(), CoreError> {
        self.toggle(INSERT, "usb", true).await
    }

    pub async fn turn_off_usb_insert(&self) -> Result<(), CoreError> {
        self.toggle(INSERT, "usb", false).await
    }

    // ── Capabilities ─────────────────────────────────────────────────

    /// Brightness control, if the host supports dimming.
    pub fn dimmer(&self) -> Result<Dimmer<'_>, CoreError> {
        let state = self.snapshot();
        let supported = state.device_type.is_dimmer() || state.host_features().iter().any(|f| f == "level");
        if !supported {
            return Err(CoreError::unsupported(
                "brightness",
                format!("{} is not dimmable", state.device_type),
            ));
        }
        Ok(Dimmer::new(self))
    }

    /// Countdown timer, if the host has one.
    pub fn timer_switch(&self) -> Result<TimerSwitch<'_>, CoreError> {
        let state = self.snapshot();
        let supported =
            state.device_type.is_timer_switch() || state.host_features().iter().any(|f| f == "timer");
        if !supported {
            return Err(CoreError::unsupported(
                "countdown timer",
                format!("{} has no timer", state.device_type),
            ));
        }
        Ok(TimerSwitch::new(self))
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// True if the device answers `/ping`.
    pub async fn ping(&self) -> bool {
        self.http().ping().await
    }

    pub async fn blink(&self) -> Result<(), CoreError> {
        self.http().blink().await?;
        Ok(())
    }

    pub async fn restart_device(&self) -> Result<(), CoreError> {
        self.http().restart_device().await?;
        Ok(())
    }

    pub async fn factory_reset(&self) -> Result<(), CoreError> {
        self.http().factory_reset().await?;
        Ok(())
    }

    /// Firmware versions the device can update to, sorted.
    pub async fn check_for_updates(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.http().check_for_updates().await?)
    }

    pub async fn update_version(&self, version: &str) -> Result<bool, CoreError> {
        Ok(self.http().update_version(version).await?)
    }

    pub async fn enable_debug_server(&self) -> Result<bool, CoreError> {
        Ok(self.http().enable_debug_server().await?)
    }

    // ── Video ────────────────────────────────────────────────────────

    fn require_video(&self, operation: &str) -> Result<(), CoreError> {
        if self.snapshot().has_video() {
            Ok(())
        } else {
            Err(CoreError::unsupported(operation, "device has no video insert"))
        }
    }

    /// URL of the JPEG snapshot endpoint.
    pub fn snapshot_url(&self) -> Result<String, CoreError> {
        self.require_video("snapshot_url")?;
        let url = self
            .http()
            .base_url()
            .join("/api/v1/picture")
            .map_err(|e| CoreError::Config {
                message: format!("Invalid URL: {e}"),
            })?;
        Ok(url.into())
    }

    /// RTSP URL for `encoding` (e.g. [`DEFAULT_STREAM_ENCODING`]).
    pub fn stream_url(&self, encoding: &str) -> Result<String, CoreError> {
        self.require_video("stream_url")?;
        let host = self.http().base_url().host_str().unwrap_or(self.host());
        Ok(format!("rtsp://{host}:{RTSP_PORT}/{encoding}"))
    }

    /// Fetch a JPEG snapshot, optionally at `(width, height)`. `None` if
    /// the device did not produce one.
    pub async fn get_snapshot_bytes(&self, size: Option<(u32, u32)>) -> Result<Option<Bytes>, CoreError> {
        self.require_video("get_snapshot_bytes")?;
        Ok(self.http().get_picture(size).await?)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("host", &self.host())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Feed supervisor events into the dispatcher.
async fn event_pump_task(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::UnboundedReceiver<SocketEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                dispatcher.handle_event(event);
            }
        }
    }
}

/// Hand merged notifications to the current subscriber, in order.
async fn delivery_task(
    subscriber: Arc<ArcSwap<Subscriber>>,
    mut rx: mpsc::UnboundedReceiver<Arc<StateDelta>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            delta = rx.recv() => {
                let Some(delta) = delta else { break };
                let current = subscriber.load_full();
                if matches!(*current, Subscriber::None) {
                    continue;
                }
                // Awaited one at a time to keep receive order.
                if let Err(e) = tokio::task::spawn_blocking(move || current.notify(delta)).await {
                    warn!(error = %e, "subscriber callback panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn http_only(host: &str) -> Device {
        let mut config = DeviceConfig::new(host, SecretString::from("k".to_string()));
        config.use_https = false;
        config.use_websockets = false;
        Device::new(config).expect("device")
    }

    #[test]
    fn fresh_device_has_placeholder_name() {
        let device = http_only("10.0.0.9");
        assert_eq!(device.friendly_name(), UNKNOWN_DEVICE_NAME);
        assert_eq!(device.status(), ConnectionStatus::Disconnected);
        assert!(!device.is_connected());
    }

    #[test]
    fn video_urls_need_a_video_insert() {
        let device = http_only("10.0.0.9");
        assert!(matches!(device.snapshot_url(), Err(CoreError::UnsupportedOperation { .. })));
        assert!(matches!(
            device.stream_url(DEFAULT_STREAM_ENCODING),
            Err(CoreError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn capabilities_follow_device_type() {
        let device = http_only("10.0.0.9");
        assert!(device.dimmer().is_err());
        assert!(device.timer_switch().is_err());
    }

    #[tokio::test]
    async fn connect_without_websockets_is_unsupported() {
        let device = http_only("10.0.0.9");
        let err = device.connect().await.expect_err("no socket");
        assert!(matches!(err, CoreError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn closed_device_refuses_commands() {
        let device = http_only("10.0.0.9");
        device.close().await;
        device.close().await;
        let err = device.turn_on().await.expect_err("closed");
        assert!(matches!(err, CoreError::ConnectionClosed));
    }
}
