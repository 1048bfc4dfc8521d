// swidget-core: Device handle, dispatch and cached state between swidget-api and consumers (CLI).

pub mod capability;
pub mod config;
pub mod convert;
pub mod device;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod provision;
pub mod store;
pub mod subscriber;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capability::{Dimmer, MAX_BRIGHTNESS, TimerSwitch};
pub use config::DeviceConfig;
pub use device::{DEFAULT_STREAM_ENCODING, Device, UNKNOWN_DEVICE_NAME, UPDATE_THROTTLE};
pub use discovery::{DiscoveredDevice, discover_devices, discover_single};
pub use error::CoreError;
pub use provision::{ProvisionPolicy, ProvisionRequest, Provisioned, provision_wifi};
pub use store::StateStore;
pub use subscriber::Subscriber;

// Socket-level types consumers see through `Device`.
pub use swidget_api::websocket::{ConnectionStatus, NotificationKind, StateDelta};

// Re-export model types at the crate root for ergonomics.
pub use model::{Assembly, Component, DeviceConfiguration, DeviceState, DeviceType, HwInfo, InsertType, Summary};
