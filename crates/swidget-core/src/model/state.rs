// ── Cached device state ──
//
// `DeviceState` is the value the store swaps atomically. All mutation
// happens through the `apply_*` methods, each of which is a pure
// last-writer-wins merge of one document into the current value.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use super::configuration::DeviceConfiguration;
use super::device_type::{DeviceType, InsertType};

/// Host assembly name on the wire.
pub const HOST: &str = "host";
/// Insert assembly name on the wire.
pub const INSERT: &str = "insert";

/// Functions on an insert component that carry no readable value.
const NON_VALUE_FUNCTIONS: [&str; 5] = ["toggle", "pic", "audio", "rtsp", "storage"];

/// One addressable part of an assembly, e.g. outlet `"0"` or sensor
/// `"temperature"`. Function values are `null` until the device reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Component {
    pub functions: BTreeMap<String, Value>,
}

impl Component {
    pub fn function(&self, name: &str) -> Option<&Value> {
        self.functions.get(name).filter(|v| !v.is_null())
    }
}

/// The host (wall unit) or insert half of the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assembly {
    /// Raw `type` tag.
    pub kind: String,
    pub id: Option<String>,
    pub error: Option<Value>,
    pub components: BTreeMap<String, Component>,
}

impl Assembly {
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn function(&self, component: &str, function: &str) -> Option<&Value> {
        self.component(component)?.function(function)
    }
}

/// Summary fields as reported by the device, already typed.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub model: String,
    pub mac: String,
    pub version: String,
    pub host: Assembly,
    pub insert: Assembly,
}

/// Everything known about a device. Snapshots of this are what callers read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceState {
    pub model: Option<String>,
    pub mac: Option<String>,
    pub version: Option<String>,
    /// Host assembly id, used as the device id.
    pub id: Option<String>,
    pub device_type: DeviceType,
    pub insert_type: InsertType,
    pub host: Assembly,
    pub insert: Assembly,
    pub rssi: Option<i64>,
    pub friendly_name: Option<String>,
    pub configuration: DeviceConfiguration,
}

impl DeviceState {
    // ── Merges ───────────────────────────────────────────────────────

    /// Replace the summary fields and assembly layout. Function values the
    /// device still lists keep their last known value.
    pub fn apply_summary(&mut self, summary: Summary) {
        self.model = Some(summary.model);
        self.mac = Some(summary.mac);
        self.version = Some(summary.version);
        self.device_type = DeviceType::from_tag(&summary.host.kind);
        self.insert_type = InsertType::from_tag(&summary.insert.kind);
        self.id.clone_from(&summary.host.id);
        self.host = carry_values(&self.host, summary.host);
        self.insert = carry_values(&self.insert, summary.insert);
    }

    /// Merge a state document: `connection.rssi` plus
    /// `{host|insert}.components.{id}.{function}` values.
    pub fn apply_state(&mut self, body: &Value) {
        if let Some(rssi) = body.pointer("/connection/rssi").and_then(Value::as_i64) {
            self.rssi = Some(rssi);
        }
        merge_components(&mut self.host, body.get(HOST));
        merge_components(&mut self.insert, body.get(INSERT));
    }

    // ── Derived views ────────────────────────────────────────────────

    pub fn assembly(&self, name: &str) -> Option<&Assembly> {
        match name {
            HOST => Some(&self.host),
            INSERT => Some(&self.insert),
            _ => None,
        }
    }

    /// Function names of host component `"0"`.
    pub fn host_features(&self) -> Vec<String> {
        self.host
            .component("0")
            .map(|c| c.functions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Component ids of the insert.
    pub fn insert_features(&self) -> Vec<String> {
        self.insert.components.keys().cloned().collect()
    }

    pub fn has_video(&self) -> bool {
        self.insert.components.contains_key(InsertType::Video.as_ref())
    }

    /// Main load is on.
    pub fn is_on(&self) -> bool {
        toggle_is_on(self.host.function("0", "toggle"))
    }

    /// USB insert output is on.
    pub fn usb_is_on(&self) -> bool {
        toggle_is_on(self.insert.function("usb", "toggle"))
    }

    /// Dimmer level: `level.now`, else `level.default`.
    pub fn brightness(&self) -> Option<i64> {
        let level = self.host.function("0", "level")?;
        level
            .get("now")
            .and_then(Value::as_i64)
            .or_else(|| level.get("default").and_then(Value::as_i64))
    }

    /// Readable values of one insert component, keyed by function.
    pub fn function_values(&self, component: &str) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        let Some(component) = self.insert.component(component) else {
            return values;
        };
        for (function, data) in &component.functions {
            if NON_VALUE_FUNCTIONS.contains(&function.as_str()) {
                continue;
            }
            match function.as_str() {
                "occupied" | "sd" => {
                    if let Some(state) = data.get("state") {
                        values.insert(function.clone(), state.clone());
                    }
                }
                "webrtc" => {
                    if let Some(max) = data.get("maxViewers") {
                        values.insert("webrtc_max_viewers".into(), max.clone());
                    }
                    if let Some(current) = data.get("currentViewers") {
                        values.insert("webrtc_current_viewers".into(), current.clone());
                    }
                }
                _ => {
                    if let Some(now) = data.get("now") {
                        values.insert(function.clone(), now.clone());
                    }
                }
            }
        }
        values
    }

    /// Single sensor reading: `occupied` reads `state`, everything else `now`.
    pub fn sensor_value(&self, component: &str, sensor: &str) -> Option<&Value> {
        let data = self.insert.function(component, sensor)?;
        let field = if sensor == "occupied" { "state" } else { "now" };
        data.get(field)
    }

    /// Current draw of one host component in watts.
    pub fn child_consumption(&self, plug: &str) -> Option<f64> {
        self.host
            .function(plug, "power")?
            .get("current")
            .and_then(Value::as_f64)
    }

    /// `power_{id}` for every host component, or `None` if any of them is
    /// not metered.
    pub fn all_child_consumption(&self) -> Option<BTreeMap<String, f64>> {
        self.host
            .components
            .keys()
            .map(|id| Some((format!("power_{id}"), self.child_consumption(id)?)))
            .collect()
    }

    /// Sum of all metered host components, `None` if nothing is metered.
    pub fn total_consumption(&self) -> Option<f64> {
        let readings: Vec<f64> = self
            .host
            .components
            .keys()
            .filter_map(|id| self.child_consumption(id))
            .collect();
        (!readings.is_empty()).then(|| readings.iter().sum())
    }

    /// Insert sensor values, rssi, and per-plug power in one map.
    pub fn realtime_values(&self) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        for feature in self.insert.components.keys() {
            values.extend(self.function_values(feature));
        }
        values.insert("rssi".into(), self.rssi.map_or(Value::Null, Value::from));
        if let Some(power) = self.all_child_consumption() {
            values.extend(power.into_iter().map(|(k, v)| (k, Value::from(v))));
        }
        values
    }

    /// Stream names listed under the video insert's `rtsp.streams`.
    pub fn available_stream_types(&self) -> Vec<String> {
        self.insert
            .function("video", "rtsp")
            .and_then(|rtsp| rtsp.get("streams"))
            .and_then(Value::as_object)
            .map(|streams| {
                streams
                    .values()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn toggle_is_on(toggle: Option<&Value>) -> bool {
    toggle.and_then(|t| t.get("state")).and_then(Value::as_str) == Some("on")
}

fn carry_values(previous: &Assembly, mut next: Assembly) -> Assembly {
    for (id, component) in &mut next.components {
        let Some(old) = previous.components.get(id) else {
            continue;
        };
        for (function, value) in &mut component.functions {
            if let Some(old_value) = old.functions.get(function) {
                if value.is_null() {
                    value.clone_from(old_value);
                }
            }
        }
    }
    next
}

fn merge_components(assembly: &mut Assembly, body: Option<&Value>) {
    let Some(components) = body
        .and_then(|b| b.get("components"))
        .and_then(Value::as_object)
    else {
        return;
    };
    for (id, functions) in components {
        let Some(functions) = functions.as_object() else {
            continue;
        };
        merge_functions(assembly.components.entry(id.clone()).or_default(), functions);
    }
}

fn merge_functions(component: &mut Component, functions: &Map<String, Value>) {
    for (name, value) in functions {
        component.functions.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn assembly(kind: &str, components: &[(&str, &[&str])]) -> Assembly {
        Assembly {
            kind: kind.into(),
            id: None,
            error: None,
            components: components
                .iter()
                .map(|(id, functions)| {
                    let functions = functions.iter().map(|f| ((*f).to_owned(), Value::Null)).collect();
                    ((*id).to_owned(), Component { functions })
                })
                .collect(),
        }
    }

    fn thm_outlet() -> DeviceState {
        let mut state = DeviceState::default();
        state.apply_summary(Summary {
            model: "SW-OUT-1".into(),
            mac: "aabbccddeeff".into(),
            version: "1.4.2".into(),
            host: assembly("outlet", &[("0", &["toggle", "power"]), ("1", &["toggle", "power"])]),
            insert: assembly(
                "TEMP HUMI MOTION",
                &[
                    ("temperature", &["temperature"]),
                    ("humidity", &["humidity"]),
                    ("motion", &["occupied", "toggle"]),
                ],
            ),
        });
        state
    }

    #[test]
    fn summary_sets_types() {
        let state = thm_outlet();
        assert_eq!(state.device_type, DeviceType::Outlet);
        assert_eq!(state.insert_type, InsertType::TempHumiMotion);
        assert_eq!(state.host_features(), vec!["power", "toggle"]);
        assert_eq!(state.insert_features(), vec!["humidity", "motion", "temperature"]);
    }

    #[test]
    fn state_merge_is_last_writer_wins() {
        let mut state = thm_outlet();
        state.apply_state(&json!({
            "connection": { "rssi": -60 },
            "host": { "components": { "0": { "toggle": { "state": "off" } } } }
        }));
        state.apply_state(&json!({
            "host": { "components": { "0": { "toggle": { "state": "on" } } } }
        }));
        assert!(state.is_on());
        assert_eq!(state.rssi, Some(-60));
    }

    #[test]
    fn realtime_values_cover_sensors_rssi_and_power() {
        let mut state = thm_outlet();
        state.apply_state(&json!({
            "connection": { "rssi": -48 },
            "host": { "components": {
                "0": { "power": { "current": 12.5 } },
                "1": { "power": { "current": 2.5 } }
            } },
            "insert": { "components": {
                "temperature": { "temperature": { "now": 21.5 } },
                "humidity": { "humidity": { "now": 40 } },
                "motion": { "occupied": { "state": true }, "toggle": { "state": "on" } }
            } }
        }));

        let values = state.realtime_values();
        assert_eq!(values["temperature"], json!(21.5));
        assert_eq!(values["humidity"], json!(40));
        assert_eq!(values["occupied"], json!(true));
        assert_eq!(values["rssi"], json!(-48));
        assert_eq!(values["power_0"], json!(12.5));
        assert_eq!(values["power_1"], json!(2.5));
        assert!(!values.contains_key("toggle"));
        assert_eq!(state.total_consumption(), Some(15.0));
        assert_eq!(state.sensor_value("motion", "occupied"), Some(&json!(true)));
        assert_eq!(state.sensor_value("temperature", "temperature"), Some(&json!(21.5)));
    }

    #[test]
    fn unmetered_host_has_no_power_values() {
        let mut state = thm_outlet();
        state.apply_state(&json!({
            "host": { "components": { "0": { "power": { "current": 3.0 } } } }
        }));
        assert_eq!(state.all_child_consumption(), None);
        assert_eq!(state.child_consumption("0"), Some(3.0));
        assert_eq!(state.total_consumption(), Some(3.0));
    }

    #[test]
    fn summary_refresh_keeps_known_values() {
        let mut state = thm_outlet();
        state.apply_state(&json!({
            "host": { "components": { "0": { "toggle": { "state": "on" } } } }
        }));
        state.apply_summary(Summary {
            model: "SW-OUT-1".into(),
            mac: "aabbccddeeff".into(),
            version: "1.5.0".into(),
            host: assembly("outlet", &[("0", &["toggle", "power"])]),
            insert: assembly("USB", &[("usb", &["toggle"])]),
        });
        assert!(state.is_on());
        assert!(!state.usb_is_on());
        assert_eq!(state.version.as_deref(), Some("1.5.0"));
        assert_eq!(state.insert_type, InsertType::Usb);
        assert_eq!(state.insert_features(), vec!["usb"]);
    }

    #[test]
    fn brightness_falls_back_to_default() {
        let mut state = DeviceState::default();
        state.apply_state(&json!({ "host": { "components": { "0": { "level": { "default": 70 } } } } }));
        assert_eq!(state.brightness(), Some(70));
        state.apply_state(&json!({ "host": { "components": { "0": { "level": { "now": 30, "default": 70 } } } } }));
        assert_eq!(state.brightness(), Some(30));
    }

    #[test]
    fn video_insert_values() {
        let mut state = DeviceState::default();
        state.apply_state(&json!({ "insert": { "components": { "video": {
            "webrtc": { "maxViewers": 4, "currentViewers": 1 },
            "rtsp": { "streams": { "a": "ph264", "b": "pmjpeg" } },
            "sd": { "state": "mounted" },
            "pic": {}
        } } } }));
        assert!(state.has_video());
        let values = state.function_values("video");
        assert_eq!(values["webrtc_max_viewers"], json!(4));
        assert_eq!(values["webrtc_current_viewers"], json!(1));
        assert_eq!(values["sd"], json!("mounted"));
        assert!(!values.contains_key("rtsp"));
        assert_eq!(state.available_stream_types(), vec!["ph264", "pmjpeg"]);
    }
}
