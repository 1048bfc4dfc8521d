// ── Device configuration document ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The device's configuration as returned by `/api/v1/device_config`.
///
/// Updates use dotted keys (`"led.brightness"`) to address nested values,
/// creating intermediate objects as needed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceConfiguration {
    document: Map<String, Value>,
}

impl DeviceConfiguration {
    /// Wrap a fetched document. Anything but an object yields an empty
    /// configuration.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(document) => Self { document },
            _ => Self::default(),
        }
    }

    /// True once a document has been fetched or pushed.
    pub fn is_populated(&self) -> bool {
        !self.document.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut keys = path.split('.');
        let first = self.document.get(keys.next()?)?;
        keys.try_fold(first, |node, key| node.get(key))
    }

    /// Apply every `dotted.key: value` pair in `updates`. Non-object
    /// updates are ignored.
    pub fn update(&mut self, updates: &Value) {
        let Some(updates) = updates.as_object() else {
            return;
        };
        for (path, value) in updates {
            set_nested(&mut self.document, path, value.clone());
        }
    }
}

fn set_nested(root: &mut Map<String, Value>, path: &str, value: Value) {
    let keys: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut node = root;
    for key in parents {
        let slot = node
            .entry((*key).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        node = next;
    }
    node.insert((*last).to_owned(), value);
}
