// ── Cached device state store ──
//
// Lock-free snapshot storage for one device. Readers get an
// `Arc<DeviceState>` that never blocks on I/O; writers copy, merge, and
// swap. Concurrent writers are serialized by `rcu`, so no merge is lost.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;

use swidget_api::websocket::{NotificationKind, StateDelta};

use crate::convert::summary_from_value;
use crate::model::{DeviceConfiguration, DeviceState, Summary};

/// Shared cached state of one device.
pub struct StateStore {
    state: ArcSwap<DeviceState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(DeviceState::default()),
        }
    }

    /// Current state. Cheap; safe to call from any task at any time.
    pub fn snapshot(&self) -> Arc<DeviceState> {
        self.state.load_full()
    }

    fn modify(&self, f: impl Fn(&mut DeviceState)) {
        self.state.rcu(|current| {
            let mut next = DeviceState::clone(current);
            f(&mut next);
            next
        });
    }

    // ── Writers ──────────────────────────────────────────────────────

    pub fn apply_summary(&self, summary: &Summary) {
        self.modify(|state| state.apply_summary(summary.clone()));
    }

    pub fn apply_state(&self, body: &Value) {
        self.modify(|state| state.apply_state(body));
    }

    /// Merge a socket notification.
    pub fn apply_delta(&self, delta: &StateDelta) {
        match delta.kind {
            NotificationKind::Summary => {
                if let Some(summary) = summary_from_value(&delta.body) {
                    self.apply_summary(&summary);
                }
            }
            NotificationKind::State | NotificationKind::DynamicUpdate => self.apply_state(&delta.body),
        }
    }

    pub fn set_friendly_name(&self, name: &str) {
        self.modify(|state| state.friendly_name = Some(name.to_owned()));
    }

    /// Replace the whole configuration document.
    pub fn set_configuration(&self, document: &Value) {
        self.modify(|state| state.configuration = DeviceConfiguration::from_value(document.clone()));
    }

    /// Apply dotted-key configuration updates.
    pub fn update_configuration(&self, updates: &Value) {
        self.modify(|state| state.configuration.update(updates));
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
