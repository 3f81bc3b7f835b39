//! Document shapes shared by the event store, the projector, and the
//! read-model service (§3 of the data model).

mod event;

pub use event::{EventKind, NewEvent};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document `type` discriminator, stored alongside every document in the
/// `es` container so the projector can dispatch without a schema lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Event,
    Snapshot,
    Outbox,
}

/// Immutable per-stream event record (§3 "Event document").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventDoc {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    #[serde(rename = "streamId")]
    pub stream_id: String,
    pub seq: u64,
    pub kind: String,
    pub data: Value,
    pub ts: DateTime<Utc>,
}

/// Current aggregate state for a match stream (§3 "Aggregate state").
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchAggregateState {
    pub score: Score,
    pub quarter: i64,
    pub clock: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub home: i64,
    pub away: i64,
}

/// Mutable singleton per stream, id = `snap-<streamId>` (§3 "Snapshot document").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotDoc {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    #[serde(rename = "streamId")]
    pub stream_id: String,
    #[serde(rename = "aggVersion")]
    pub agg_version: u64,
    pub state: Value,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Per-stream transactional side-effect record (§3 "Outbox document").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboxDoc {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    #[serde(rename = "streamId")]
    pub stream_id: String,
    pub kind: String,
    pub payload: Value,
    pub ts: DateTime<Utc>,
    #[serde(rename = "processedAt", skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Trainer metrics payload carried by `TrainerMetricsCaptured` events and by
/// the `tesHistory`/leaderboard read models.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainerMetrics {
    #[serde(default, alias = "Watts")]
    pub watts: f64,
    #[serde(default, alias = "Cadence")]
    pub cadence: f64,
    #[serde(default, rename = "heartRate", alias = "HeartRate")]
    pub heart_rate: f64,
    #[serde(default, rename = "riderId", alias = "RiderId")]
    pub rider_id: Option<String>,
}

/// Deterministic outbox id for an event, per §3/§4.B step 4.
pub fn outbox_id_for(event_id: &str) -> String {
    format!("out-{event_id}")
}

/// Document id for a stream's snapshot singleton.
pub fn snapshot_id_for(stream_id: &str) -> String {
    format!("snap-{stream_id}")
}

/// Whether an event `kind` implies an outbox side effect, and if so, which one.
pub fn outbox_kind_for(event_kind: &str) -> Option<&'static str> {
    match event_kind {
        "TrainerMetricsCaptured" => Some("trainerEffect"),
        _ => None,
    }
}
