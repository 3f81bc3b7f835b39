//! Component (D): query-side API over the projected read-model containers
//! (§4.D). Field access is tolerant to camelCase/PascalCase variants because
//! the projector and any legacy writers may disagree (§9 "Casing tolerance").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::store::DocumentStore;

pub const DEFAULT_CONTAINER_MATCH_STATE: &str = "rm_match_state";
pub const DEFAULT_CONTAINER_TES_HISTORY: &str = "rm_tes_history";
pub const DEFAULT_CONTAINER_LEADERBOARD: &str = "rm_leaderboard";

#[derive(Clone, Debug, Serialize)]
pub struct MatchStateView {
    #[serde(rename = "streamId")]
    pub stream_id: String,
    #[serde(rename = "scoreHome")]
    pub score_home: i64,
    #[serde(rename = "scoreAway")]
    pub score_away: i64,
    pub quarter: i64,
    pub clock: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MomentumPoint {
    pub watts: f64,
    pub cadence: f64,
    #[serde(rename = "heartRate")]
    pub heart_rate: f64,
    #[serde(rename = "capturedAt")]
    pub captured_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MomentumView {
    #[serde(rename = "streamId")]
    pub stream_id: String,
    pub points: Vec<MomentumPoint>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardEntry {
    #[serde(rename = "riderId")]
    pub rider_id: Option<String>,
    pub watts: f64,
    pub cadence: f64,
    #[serde(rename = "heartRate")]
    pub heart_rate: f64,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardView {
    pub entries: Vec<LeaderboardEntry>,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
}

/// Reads the first present field among `names` (camelCase/PascalCase, §9).
fn get_tolerant<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| value.get(n))
}

fn as_f64_tolerant(value: &Value, names: &[&str]) -> f64 {
    get_tolerant(value, names).and_then(Value::as_f64).unwrap_or(0.0)
}

fn as_i64_tolerant(value: &Value, names: &[&str]) -> i64 {
    get_tolerant(value, names).and_then(Value::as_i64).unwrap_or(0)
}

fn as_str_tolerant(value: &Value, names: &[&str]) -> Option<String> {
    get_tolerant(value, names).and_then(Value::as_str).map(str::to_string)
}

fn as_datetime_tolerant(value: &Value, names: &[&str]) -> DateTime<Utc> {
    get_tolerant(value, names)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Clone)]
pub struct ReadModelService<S: DocumentStore> {
    store: S,
    match_state_container: String,
    tes_history_container: String,
    leaderboard_container: String,
}

impl<S: DocumentStore> ReadModelService<S> {
    pub fn new(
        store: S,
        match_state_container: impl Into<String>,
        tes_history_container: impl Into<String>,
        leaderboard_container: impl Into<String>,
    ) -> Self {
        Self {
            store,
            match_state_container: match_state_container.into(),
            tes_history_container: tes_history_container.into(),
            leaderboard_container: leaderboard_container.into(),
        }
    }

    pub async fn get_match_state(&self, stream_id: &str) -> Option<MatchStateView> {
        let doc = self
            .store
            .read_item(&self.match_state_container, stream_id, stream_id)
            .await
            .ok()?;
        Some(match_state_view_from(stream_id, &doc.body))
    }

    /// Returns the most recent `max_points` momentum rows for `stream_id`,
    /// sorted ascending by `capturedAt` (§4.D).
    pub async fn get_momentum(&self, stream_id: &str, max_points: usize) -> Option<MomentumView> {
        let rows = self
            .store
            .query_partition(&self.tes_history_container, stream_id)
            .await
            .ok()?;
        if rows.is_empty() {
            return None;
        }

        let mut points: Vec<MomentumPoint> = rows.iter().map(momentum_point_from).collect();
        // Descending by capturedAt to select the newest window, per §4.D.
        points.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        points.truncate(max_points);
        points.sort_by(|a, b| a.captured_at.cmp(&b.captured_at));

        Some(MomentumView {
            stream_id: stream_id.to_string(),
            points,
        })
    }

    /// Returns the top `top` leaderboard entries across every stream,
    /// descending by watts (§4.D).
    pub async fn get_leaderboard(&self, top: usize) -> LeaderboardView {
        let rows = self
            .store
            .query_all(&self.leaderboard_container)
            .await
            .unwrap_or_default();

        let mut entries: Vec<LeaderboardEntry> = rows.iter().map(leaderboard_entry_from).collect();
        entries.sort_by(|a, b| b.watts.partial_cmp(&a.watts).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(top);

        LeaderboardView {
            entries,
            generated_at: Utc::now(),
        }
    }
}

fn match_state_view_from(stream_id: &str, body: &Value) -> MatchStateView {
    let state = get_tolerant(body, &["state", "State"]).cloned().unwrap_or(Value::Null);
    let score = get_tolerant(&state, &["score", "Score"]).cloned().unwrap_or(Value::Null);
    MatchStateView {
        stream_id: stream_id.to_string(),
        score_home: as_i64_tolerant(&score, &["home", "Home"]),
        score_away: as_i64_tolerant(&score, &["away", "Away"]),
        quarter: as_i64_tolerant(&state, &["quarter", "Quarter"]),
        clock: as_str_tolerant(&state, &["clock", "Clock"]).unwrap_or_default(),
        updated_at: as_datetime_tolerant(body, &["updatedAt", "UpdatedAt"]),
    }
}

fn momentum_point_from(body: &Value) -> MomentumPoint {
    let metrics = get_tolerant(body, &["metrics", "Metrics"]).cloned().unwrap_or(Value::Null);
    MomentumPoint {
        watts: as_f64_tolerant(&metrics, &["watts", "Watts"]),
        cadence: as_f64_tolerant(&metrics, &["cadence", "Cadence"]),
        heart_rate: as_f64_tolerant(&metrics, &["heartRate", "HeartRate"]),
        captured_at: as_datetime_tolerant(body, &["ts", "Ts", "capturedAt"]),
    }
}

fn leaderboard_entry_from(body: &Value) -> LeaderboardEntry {
    let metrics = get_tolerant(body, &["metrics", "Metrics"]).cloned().unwrap_or(Value::Null);
    LeaderboardEntry {
        rider_id: as_str_tolerant(&metrics, &["riderId", "RiderId"]),
        watts: as_f64_tolerant(&metrics, &["watts", "Watts"]),
        cadence: as_f64_tolerant(&metrics, &["cadence", "Cadence"]),
        heart_rate: as_f64_tolerant(&metrics, &["heartRate", "HeartRate"]),
        updated_at: as_datetime_tolerant(body, &["updatedAt", "UpdatedAt"]),
    }
}

/// Object-safe facade so the hub can prime a new subscriber without being
/// generic over the document-store backend. Callers pass `max_points`/`top`
/// explicitly (read live from `RuntimeConfig` at the call site) rather than
/// this trait baking in a window size, so an admin `PUT` changes what the
/// hub pushes on the very next subscribe, matching the GET read-model
/// endpoints (§2 "Supplemented features").
#[async_trait]
pub trait ReadModelQuery: Send + Sync {
    async fn match_state_json(&self, stream_id: &str) -> Option<Value>;
    async fn momentum_json(&self, stream_id: &str, max_points: usize) -> Option<Value>;
    async fn leaderboard_json(&self, top: usize) -> Value;
}

#[async_trait]
impl<S: DocumentStore + Send + Sync> ReadModelQuery for ReadModelService<S> {
    async fn match_state_json(&self, stream_id: &str) -> Option<Value> {
        self.get_match_state(stream_id).await.and_then(|v| serde_json::to_value(v).ok())
    }

    async fn momentum_json(&self, stream_id: &str, max_points: usize) -> Option<Value> {
        self.get_momentum(stream_id, max_points).await.and_then(|v| serde_json::to_value(v).ok())
    }

    async fn leaderboard_json(&self, top: usize) -> Value {
        let view = self.get_leaderboard(top).await;
        serde_json::to_value(view).unwrap_or(Value::Null)
    }
}
