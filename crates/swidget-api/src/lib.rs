// swidget-api: Async Rust client for the Swidget local device API (HTTP + websocket)

pub mod discovery;
pub mod error;
pub mod http;
pub mod models;
pub mod provision;
pub mod transport;
pub mod websocket;

pub use discovery::{DiscoveredDevice, discover_devices};
pub use error::Error;
pub use http::HttpClient;
pub use provision::{ProvisionPolicy, ProvisionRequest, Provisioned, Provisioner};
pub use transport::{Credentials, DEFAULT_TOKEN_NAME, TlsMode, TransportConfig};
pub use websocket::{
    CommandRequest, ConnectionStatus, CorrelationId, Frame, NotificationKind, QueryKind, ReconnectConfig,
    SocketEndpoint, SocketEvent, SocketSupervisor, StateDelta,
};
