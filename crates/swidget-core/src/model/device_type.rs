// ── Device and insert type tags ──
//
// The host assembly's `type` decides what the device can do; the insert
// assembly's `type` decides which sensors or accessories are attached.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// What kind of wall device this is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
pub enum DeviceType {
    #[strum(serialize = "dimmer")]
    #[serde(rename = "dimmer")]
    Dimmer,
    #[strum(serialize = "outlet")]
    #[serde(rename = "outlet")]
    Outlet,
    #[strum(serialize = "switch")]
    #[serde(rename = "switch")]
    Switch,
    /// 20/40/60 countdown switch.
    #[strum(serialize = "pana_switch")]
    #[serde(rename = "pana_switch")]
    TimerSwitch,
    #[strum(serialize = "relay_switch")]
    #[serde(rename = "relay_switch")]
    RelaySwitch,
    #[default]
    #[strum(serialize = "unknown")]
    #[serde(rename = "unknown")]
    Unknown,
}

impl DeviceType {
    /// Parse the host `type` tag, mapping anything unrecognised to `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or(Self::Unknown)
    }

    pub fn is_switch(self) -> bool {
        matches!(self, Self::Switch | Self::TimerSwitch | Self::RelaySwitch)
    }

    pub fn is_dimmer(self) -> bool {
        self == Self::Dimmer
    }

    pub fn is_outlet(self) -> bool {
        self == Self::Outlet
    }

    pub fn is_timer_switch(self) -> bool {
        self == Self::TimerSwitch
    }
}

/// What is plugged into the insert slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
pub enum InsertType {
    #[strum(serialize = "USB")]
    #[serde(rename = "USB")]
    Usb,
    #[strum(serialize = "TEMP HUMI MOTION")]
    #[serde(rename = "TEMP HUMI MOTION")]
    TempHumiMotion,
    #[strum(serialize = "TEMP HUMI")]
    #[serde(rename = "TEMP HUMI")]
    TempHumi,
    #[strum(serialize = "AIR QUALITY")]
    #[serde(rename = "AIR QUALITY")]
    AirQuality,
    #[strum(serialize = "GUIDE LIGHT")]
    #[serde(rename = "GUIDE LIGHT")]
    GuideLight,
    #[strum(serialize = "POWER OUT")]
    #[serde(rename = "POWER OUT")]
    PowerOut,
    // Lower case on the wire, unlike the others.
    #[strum(serialize = "video")]
    #[serde(rename = "video")]
    Video,
    #[default]
    #[strum(serialize = "unknown")]
    #[serde(rename = "unknown")]
    Unknown,
}

impl InsertType {
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or(Self::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_tags() {
        assert_eq!(DeviceType::from_tag("dimmer"), DeviceType::Dimmer);
        assert_eq!(DeviceType::from_tag("pana_switch"), DeviceType::TimerSwitch);
        assert_eq!(DeviceType::from_tag("relay_switch"), DeviceType::RelaySwitch);
        assert_eq!(DeviceType::from_tag("toaster"), DeviceType::Unknown);
        assert_eq!(DeviceType::TimerSwitch.to_string(), "pana_switch");
    }

    #[test]
    fn switch_family() {
        assert!(DeviceType::Switch.is_switch());
        assert!(DeviceType::TimerSwitch.is_switch());
        assert!(DeviceType::RelaySwitch.is_switch());
        assert!(!DeviceType::Dimmer.is_switch());
        assert!(!DeviceType::Outlet.is_switch());
    }

    #[test]
    fn insert_type_tags() {
        assert_eq!(InsertType::from_tag("TEMP HUMI MOTION"), InsertType::TempHumiMotion);
        assert_eq!(InsertType::from_tag("TEMP HUMI"), InsertType::TempHumi);
        assert_eq!(InsertType::from_tag("video"), InsertType::Video);
        assert_eq!(InsertType::from_tag("VIDEO"), InsertType::Unknown);
        assert_eq!(InsertType::AirQuality.as_ref(), "AIR QUALITY");
    }
}
