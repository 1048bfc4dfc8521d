// ── Device discovery ──
//
// Finding devices on the LAN (SSDP) and turning an address into a typed
// `Device`.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

pub use swidget_api::discovery::{DEFAULT_DISCOVERY_TIMEOUT, DiscoveredDevice};

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::error::CoreError;
use crate::model::DeviceType;

/// Search the local network for `timeout`. Results are keyed by MAC.
pub async fn discover_devices(timeout: Duration) -> Result<BTreeMap<String, DiscoveredDevice>, CoreError> {
    let devices = swidget_api::discover_devices(timeout).await?;
    debug!(count = devices.len(), "discovery finished");
    Ok(devices)
}

/// Build a device for `config.host` and load its summary.
///
/// Fails with `UnsupportedOperation` when the host reports a type this
/// crate does not know.
pub async fn discover_single(config: DeviceConfig) -> Result<Device, CoreError> {
    let device = Device::new(config)?;
    let summary = device.refresh_summary().await?;

    if DeviceType::from_tag(&summary.host.kind) == DeviceType::Unknown {
        device.close().await;
        return Err(CoreError::unsupported(
            "discover_single",
            format!("unknown device type {:?}", summary.host.kind),
        ));
    }
    Ok(device)
}
