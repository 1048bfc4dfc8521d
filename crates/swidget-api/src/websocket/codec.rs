//! Frame codec for the device websocket.
//!
//! Every frame is one JSON object carried in a websocket text message.
//! Outbound frames always carry a numeric `request_id`; the device echoes it
//! on the matching reply, which is how responses are told apart from the
//! unsolicited `summary` / `state` / `DYNAMIC_UPDATE` notifications.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Error;

/// Identifier tying a response frame to the command that caused it.
pub type CorrelationId = u64;

/// Envelope keys stripped from a frame when it has no `payload` field.
const ENVELOPE_KEYS: [&str; 3] = ["type", "request_id", "payload"];

// ── Outbound model ───────────────────────────────────────────────────

/// A single function invocation on a device component.
///
/// Renders as the nested document the device understands on both
/// transports: `{assembly: {components: {component: {function: payload}}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// `host` or `insert`.
    pub assembly: String,
    /// Component id within the assembly, e.g. `"0"` or `"usb"`.
    pub component: String,
    /// Function name, e.g. `toggle`, `level`, `timer`.
    pub function: String,
    pub payload: Value,
}

impl CommandRequest {
    pub fn new(
        assembly: impl Into<String>,
        component: impl Into<String>,
        function: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            assembly: assembly.into(),
            component: component.into(),
            function: function.into(),
            payload,
        }
    }

    /// The nested command document.
    pub fn to_document(&self) -> Value {
        json!({
            self.assembly.as_str(): {
                "components": {
                    self.component.as_str(): {
                        self.function.as_str(): self.payload
                    }
                }
            }
        })
    }

    /// Inverse of [`to_document`](Self::to_document). Returns `None` unless
    /// the document names exactly one assembly/component/function.
    pub fn from_document(document: &Value) -> Option<Self> {
        let (assembly, body) = single_entry(document.as_object()?)?;
        let components = body.get("components")?.as_object()?;
        let (component, functions) = single_entry(components)?;
        let (function, payload) = single_entry(functions.as_object()?)?;
        Some(Self::new(assembly, component, function, payload.clone()))
    }
}

fn single_entry(map: &Map<String, Value>) -> Option<(&String, &Value)> {
    let mut iter = map.iter();
    let entry = iter.next()?;
    iter.next().is_none().then_some(entry)
}

/// Read-only requests the device answers with a state document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Summary,
    State,
}

impl QueryKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::State => "state",
        }
    }
}

/// Build a command frame.
pub fn encode_command(correlation_id: CorrelationId, command: &CommandRequest) -> String {
    json!({
        "type": "command",
        "request_id": correlation_id,
        "payload": command.to_document(),
    })
    .to_string()
}

/// Build a configuration-push frame. Socket-only; the HTTP API has no
/// equivalent endpoint.
pub fn encode_config(correlation_id: CorrelationId, payload: &Value) -> String {
    json!({
        "type": "config",
        "request_id": correlation_id,
        "payload": payload,
    })
    .to_string()
}

/// Build a summary/state query frame.
pub fn encode_query(correlation_id: CorrelationId, kind: QueryKind) -> String {
    json!({
        "type": kind.as_str(),
        "request_id": correlation_id,
    })
    .to_string()
}

// ── Inbound model ────────────────────────────────────────────────────

/// What a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Full summary document (model, mac, assemblies).
    Summary,
    /// Full state document.
    State,
    /// Partial state pushed by the device when something changes.
    DynamicUpdate,
}

impl NotificationKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(Self::Summary),
            // Older firmware tags command echoes with a literal "command" id.
            "state" | "command" => Some(Self::State),
            "DYNAMIC_UPDATE" => Some(Self::DynamicUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summary => write!(f, "summary"),
            Self::State => write!(f, "state"),
            Self::DynamicUpdate => write!(f, "DYNAMIC_UPDATE"),
        }
    }
}

/// A state change pushed by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub kind: NotificationKind,
    pub body: Value,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Notification(StateDelta),
    Response {
        correlation_id: CorrelationId,
        /// `Err` carries the device's error message for the command.
        result: Result<Value, String>,
    },
    /// Well-formed but not something we can act on.
    Error { reason: String },
}

/// Decode one inbound text frame.
///
/// Only input that is not a JSON object yields an error; anything that
/// parses but is unexpected is classified as [`Frame::Error`].
pub fn decode(raw: &str) -> Result<Frame, Error> {
    let value: Value = serde_json::from_str(raw).map_err(|e| Error::MalformedFrame {
        reason: e.to_string(),
    })?;
    let Value::Object(object) = value else {
        return Err(Error::MalformedFrame {
            reason: format!("expected a JSON object, got {}", type_name(&value)),
        });
    };

    let frame_type = object.get("type").and_then(Value::as_str);
    if frame_type == Some("error") {
        return Ok(Frame::Error {
            reason: error_reason(&object).unwrap_or_else(|| "device reported an error".into()),
        });
    }

    let request_id = object.get("request_id");
    if let Some(correlation_id) = request_id.and_then(numeric_id) {
        let result = match object.get("error").and_then(Value::as_str) {
            Some(reason) => Err(reason.to_owned()),
            None => Ok(body_of(&object)),
        };
        return Ok(Frame::Response {
            correlation_id,
            result,
        });
    }

    let kind = request_id
        .and_then(Value::as_str)
        .and_then(NotificationKind::parse)
        .or_else(|| frame_type.and_then(NotificationKind::parse));
    if let Some(kind) = kind {
        return Ok(Frame::Notification(StateDelta {
            kind,
            body: body_of(&object),
        }));
    }

    Ok(Frame::Error {
        reason: format!(
            "unexpected frame (type={}, request_id={})",
            frame_type.unwrap_or("-"),
            request_id.map_or_else(|| "-".to_owned(), Value::to_string)
        ),
    })
}

fn numeric_id(value: &Value) -> Option<CorrelationId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}

fn error_reason(object: &Map<String, Value>) -> Option<String> {
    ["error", "reason", "message"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}

fn body_of(object: &Map<String, Value>) -> Value {
    if let Some(payload) = object.get("payload") {
        return payload.clone();
    }
    let rest: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(rest)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn toggle_on() -> CommandRequest {
        CommandRequest::new("host", "0", "toggle", json!({ "state": "on" }))
    }

    #[test]
    fn command_document_shape() {
        assert_eq!(
            toggle_on().to_document(),
            json!({ "host": { "components": { "0": { "toggle": { "state": "on" } } } } })
        );
    }

    #[test]
    fn encoded_command_decodes_as_matching_response() {
        let cmd = CommandRequest::new("insert", "usb", "toggle", json!({ "state": "off" }));
        let frame = decode(&encode_command(42, &cmd)).expect("decodes");

        let Frame::Response {
            correlation_id,
            result: Ok(body),
        } = frame
        else {
            panic!("expected a successful response, got {frame:?}");
        };
        assert_eq!(correlation_id, 42);
        assert_eq!(CommandRequest::from_document(&body), Some(cmd));
    }

    #[test]
    fn config_frame_carries_payload() {
        let payload = json!({ "led.brightness": 40 });
        let frame = decode(&encode_config(3, &payload)).expect("decodes");
        assert_eq!(
            frame,
            Frame::Response {
                correlation_id: 3,
                result: Ok(payload),
            }
        );
    }

    #[test]
    fn query_frame_shape() {
        let raw: Value = serde_json::from_str(&encode_query(9, QueryKind::Summary)).expect("json");
        assert_eq!(raw, json!({ "type": "summary", "request_id": 9 }));
    }

    #[test]
    fn string_request_id_digits_are_correlation_ids() {
        let frame = decode(r#"{"type":"command","request_id":"17","payload":{"ok":true}}"#).expect("decodes");
        assert!(matches!(frame, Frame::Response { correlation_id: 17, .. }));
    }

    #[test]
    fn response_with_error_field_is_a_failed_result() {
        let frame = decode(r#"{"request_id":5,"error":"unknown function"}"#).expect("decodes");
        assert_eq!(
            frame,
            Frame::Response {
                correlation_id: 5,
                result: Err("unknown function".into()),
            }
        );
    }

    #[test]
    fn response_with_status_message_is_still_ok() {
        let frame = decode(r#"{"request_id":7,"payload":{"ok":true},"message":"applied"}"#).expect("decodes");
        assert_eq!(
            frame,
            Frame::Response {
                correlation_id: 7,
                result: Ok(json!({ "ok": true })),
            }
        );

        let frame = decode(r#"{"request_id":8,"reason":"cached"}"#).expect("decodes");
        let Frame::Response { result, .. } = frame else {
            panic!("expected a response, got {frame:?}");
        };
        assert!(result.is_ok());
    }

    #[test]
    fn dynamic_update_is_a_notification() {
        let raw = json!({
            "request_id": "DYNAMIC_UPDATE",
            "host": { "components": { "0": { "toggle": { "state": "on" } } } }
        });
        let frame = decode(&raw.to_string()).expect("decodes");
        assert_eq!(
            frame,
            Frame::Notification(StateDelta {
                kind: NotificationKind::DynamicUpdate,
                body: json!({ "host": { "components": { "0": { "toggle": { "state": "on" } } } } }),
            })
        );
    }

    #[test]
    fn summary_notification_uses_type_when_request_id_missing() {
        let frame = decode(r#"{"type":"summary","payload":{"model":"X"}}"#).expect("decodes");
        assert_eq!(
            frame,
            Frame::Notification(StateDelta {
                kind: NotificationKind::Summary,
                body: json!({ "model": "X" }),
            })
        );
    }

    #[test]
    fn error_frame_reason() {
        let frame = decode(r#"{"type":"error","reason":"busy"}"#).expect("decodes");
        assert_eq!(frame, Frame::Error { reason: "busy".into() });
    }

    #[test]
    fn unexpected_object_is_error_frame() {
        let frame = decode(r#"{"type":"firmware_progress","percent":20}"#).expect("decodes");
        assert!(matches!(frame, Frame::Error { .. }));
    }

    #[test]
    fn non_object_json_is_malformed() {
        assert!(matches!(decode("[1,2,3]"), Err(Error::MalformedFrame { .. })));
        assert!(matches!(decode("\"hello\""), Err(Error::MalformedFrame { .. })));
    }

    #[test]
    fn garbage_never_panics() {
        let inputs = [
            "",
            "{",
            "not json at all",
            "\u{0}\u{1}\u{2}",
            "{\"request_id\": -1}",
            "{\"request_id\": 1.5}",
            "{\"request_id\": \"\"}",
            "null",
        ];
        for input in inputs {
            match decode(input) {
                Err(Error::MalformedFrame { .. }) | Ok(Frame::Error { .. }) => {}
                other => panic!("{input:?} decoded as {other:?}"),
            }
        }
    }

    #[test]
    fn from_document_rejects_ambiguous_documents() {
        let two_assemblies = json!({
            "host": { "components": { "0": { "toggle": {} } } },
            "insert": { "components": { "usb": { "toggle": {} } } }
        });
        assert_eq!(CommandRequest::from_document(&two_assemblies), None);
        assert_eq!(CommandRequest::from_document(&json!([])), None);
    }
}
