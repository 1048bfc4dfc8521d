// Raw wire shapes returned by the device's HTTP API (and mirrored by the
// summary/state websocket notifications). Domain types live in
// `swidget-core`; these stay as close to the JSON as possible.

use serde::{Deserialize, Serialize};

/// `GET /api/v1/summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub model: String,
    pub mac: String,
    pub version: String,
    pub host: AssemblySummary,
    pub insert: AssemblySummary,
}

/// One physical half of the device: the wall `host` or the swappable `insert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblySummary {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub components: Vec<ComponentSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub id: String,
    #[serde(default)]
    pub functions: Vec<String>,
}

/// `GET /api/v1/name`
#[derive(Debug, Clone, Deserialize)]
pub struct NameResponse {
    pub name: String,
}

/// `GET /api/v1/update`
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatesResponse {
    #[serde(default)]
    pub updates: Vec<String>,
}
