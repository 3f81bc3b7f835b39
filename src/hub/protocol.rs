//! Wire messages for `/hub/match` (§4.F).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → server messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "sendMetrics")]
    SendMetrics { watts: f64, cadence: f64, #[serde(rename = "heartRate")] heart_rate: f64 },
    #[serde(rename = "subscribeToStream")]
    SubscribeToStream { #[serde(rename = "streamId")] stream_id: String },
}

/// Server → client envelope. `kind` drives the client-side dispatch
/// (`matchState`, `tesHistory`, `leaderboard`, `trainerEffect`, `metrics`).
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl ServerMessage {
    pub fn new(kind: &str, payload: Value) -> Self {
        Self {
            kind: kind.to_string(),
            payload,
        }
    }
}
