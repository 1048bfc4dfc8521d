// ── Domain model ──
//
// Typed view of a Swidget device: what it is (`DeviceType`, `InsertType`),
// how it is laid out (`Assembly`, `Component`), and the cached values the
// store hands out as snapshots (`DeviceState`).

pub mod configuration;
pub mod device_type;
pub mod info;
pub mod state;

// ── Re-exports ──────────────────────────────────────────────────────

pub use configuration::DeviceConfiguration;
pub use device_type::{DeviceType, InsertType};
pub use info::HwInfo;
pub use state::{Assembly, Component, DeviceState, HOST, INSERT, Summary};
