// ── Capability views ──
//
// Extra operations that only some device types support. A view is handed
// out by `Device::dimmer()` / `Device::timer_switch()` after checking the
// cached feature set, so it needs `update()` to have run at least once.

use serde_json::json;

use crate::device::Device;
use crate::error::CoreError;
use crate::model::HOST;

/// Highest brightness level a dimmer accepts.
pub const MAX_BRIGHTNESS: u8 = 100;

fn check_level(level: u8) -> Result<(), CoreError> {
    if level > MAX_BRIGHTNESS {
        return Err(CoreError::ValidationFailed {
            message: format!("brightness must be between 0 and {MAX_BRIGHTNESS}, got {level}"),
        });
    }
    Ok(())
}

// ── Dimmer ───────────────────────────────────────────────────────────

/// Brightness control on a dimmer's host component.
#[derive(Debug, Clone, Copy)]
pub struct Dimmer<'a> {
    device: &'a Device,
}

impl<'a> Dimmer<'a> {
    pub(crate) fn new(device: &'a Device) -> Self {
        Self { device }
    }

    /// Current level (0-100), falling back to the default level.
    pub fn brightness(&self) -> Option<i64> {
        self.device.snapshot().brightness()
    }

    pub async fn set_brightness(&self, level: u8) -> Result<(), CoreError> {
        check_level(level)?;
        self.device
            .send_command(HOST, "0", "level", json!({ "now": level }))
            .await?;
        Ok(())
    }

    /// Level the dimmer turns on at.
    pub async fn set_default_brightness(&self, level: u8) -> Result<(), CoreError> {
        check_level(level)?;
        self.device
            .send_command(HOST, "0", "level", json!({ "default": level }))
            .await?;
        Ok(())
    }
}

// ── TimerSwitch ──────────────────────────────────────────────────────

/// Countdown timer on a timer switch.
#[derive(Debug, Clone, Copy)]
pub struct TimerSwitch<'a> {
    device: &'a Device,
}

impl<'a> TimerSwitch<'a> {
    pub(crate) fn new(device: &'a Device) -> Self {
        Self { device }
    }

    /// Turn the load off after `minutes`.
    pub async fn set_countdown_timer(&self, minutes: u32) -> Result<(), CoreError> {
        self.device
            .send_command(HOST, "0", "timer", json!({ "duration": minutes }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_range() {
        assert!(check_level(0).is_ok());
        assert!(check_level(100).is_ok());
        assert!(matches!(check_level(101), Err(CoreError::ValidationFailed { .. })));
    }
}
