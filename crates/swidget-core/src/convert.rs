// ── API-to-domain type conversions ──
//
// Bridges raw `swidget_api` response types into `swidget_core::model`
// types. Component function lists become maps with `null` values until the
// device reports state for them.

use serde_json::Value;

use swidget_api::models::{AssemblySummary, ComponentSummary, SummaryResponse};

use crate::model::{Assembly, Component, Summary};

impl From<ComponentSummary> for Component {
    fn from(raw: ComponentSummary) -> Self {
        Self {
            functions: raw.functions.into_iter().map(|f| (f, Value::Null)).collect(),
        }
    }
}

impl From<AssemblySummary> for Assembly {
    fn from(raw: AssemblySummary) -> Self {
        Self {
            kind: raw.kind,
            id: raw.id,
            error: raw.error.filter(|e| !e.is_null()),
            components: raw
                .components
                .into_iter()
                .map(|c| (c.id.clone(), Component::from(c)))
                .collect(),
        }
    }
}

impl From<SummaryResponse> for Summary {
    fn from(raw: SummaryResponse) -> Self {
        Self {
            model: raw.model,
            mac: raw.mac,
            version: raw.version,
            host: raw.host.into(),
            insert: raw.insert.into(),
        }
    }
}

/// Parse a summary document received as a raw JSON value (socket
/// notification or query response).
pub(crate) fn summary_from_value(value: &Value) -> Option<Summary> {
    match serde_json::from_value::<SummaryResponse>(value.clone()) {
        Ok(raw) => Some(raw.into()),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring summary document");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{DeviceState, DeviceType, InsertType};

    #[test]
    fn summary_document_to_state() {
        let summary = summary_from_value(&json!({
            "model": "SW-DIM-1",
            "mac": "aabbccddeeff",
            "version": "1.4.2",
            "host": {
                "type": "dimmer",
                "id": "host-1",
                "components": [{ "id": "0", "functions": ["toggle", "level"] }]
            },
            "insert": {
                "type": "USB",
                "components": [{ "id": "usb", "functions": ["toggle"] }]
            }
        }))
        .expect("summary");

        let mut state = DeviceState::default();
        state.apply_summary(summary);
        assert_eq!(state.device_type, DeviceType::Dimmer);
        assert_eq!(state.insert_type, InsertType::Usb);
        assert_eq!(state.id.as_deref(), Some("host-1"));
        assert_eq!(state.host.components["0"].functions["level"], Value::Null);
    }

    #[test]
    fn incomplete_summary_is_ignored() {
        assert!(summary_from_value(&json!({ "model": "X" })).is_none());
    }
}
