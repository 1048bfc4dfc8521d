// ── Hardware information ──

use serde::Serialize;

use super::device_type::{DeviceType, InsertType};
use super::state::DeviceState;

/// Hardware-related subset of the cached state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HwInfo {
    pub version: Option<String>,
    pub mac_address: Option<String>,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub id: Option<String>,
    pub model: Option<String>,
    pub insert_type: InsertType,
    pub insert_features: Vec<String>,
    pub host_features: Vec<String>,
    pub rssi: Option<i64>,
}

impl From<&DeviceState> for HwInfo {
    fn from(state: &DeviceState) -> Self {
        Self {
            version: state.version.clone(),
            mac_address: state.mac.clone(),
            device_type: state.device_type,
            id: state.id.clone(),
            model: state.model.clone(),
            insert_type: state.insert_type,
            insert_features: state.insert_features(),
            host_features: state.host_features(),
            rssi: state.rssi,
        }
    }
}
