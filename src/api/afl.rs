//! `GET /api/afl/matches/{streamId}` and `POST /api/afl/matches/{streamId}/apply`
//! (§6) — the AFL-specific mirror of `matches.rs`, returning the full
//! envelope (`streamId`, `aggregateVersion`, `etag`, `state`) instead of bare
//! state.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::eventstore::AppendError;
use crate::model::{snapshot_id_for, EventKind, NewEvent};
use crate::store::{DocumentStore, StoreError};

pub use super::matches::{AppendRequest, MatchesAppState as AflAppState};

#[derive(Serialize)]
struct MatchEnvelope {
    #[serde(rename = "streamId")]
    stream_id: String,
    #[serde(rename = "aggregateVersion")]
    aggregate_version: u64,
    etag: String,
    state: Value,
}

#[derive(Serialize)]
struct Problem {
    detail: String,
}

pub fn create_afl_router(state: AflAppState) -> Router {
    Router::new()
        .route("/api/afl/matches/:stream_id", get(get_afl_match))
        .route("/api/afl/matches/:stream_id/apply", post(apply_afl_match))
        .with_state(Arc::new(state))
}

async fn load_envelope(state: &AflAppState, stream_id: &str) -> Result<MatchEnvelope, StoreError> {
    let doc = state
        .store
        .read_item(&state.events_container, &snapshot_id_for(stream_id), stream_id)
        .await?;
    Ok(MatchEnvelope {
        stream_id: stream_id.to_string(),
        aggregate_version: doc.body.get("aggVersion").and_then(Value::as_u64).unwrap_or(0),
        etag: doc.etag,
        state: doc.body.get("state").cloned().unwrap_or(Value::Null),
    })
}

async fn get_afl_match(State(state): State<Arc<AflAppState>>, Path(stream_id): Path<String>) -> Response {
    match load_envelope(&state, &stream_id).await {
        Ok(envelope) => Json(envelope).into_response(),
        Err(StoreError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(error = %e, "failed to read AFL match state");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn apply_afl_match(
    State(state): State<Arc<AflAppState>>,
    Path(stream_id): Path<String>,
    body: Bytes,
) -> Response {
    let limit = state.runtime_config.read().unwrap().body_size_limit_single_bytes;
    if body.len() > limit {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let request: AppendRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(Problem { detail: e.to_string() })).into_response(),
    };

    let events: Vec<NewEvent> = request
        .events
        .into_iter()
        .map(|e| NewEvent {
            id: if e.id.is_empty() { Uuid::new_v4().to_string() } else { e.id },
            // Canonicalize so the outbox/projector's exact-match dispatch
            // still fires regardless of the casing a client submitted (§6).
            kind: EventKind::parse(&e.kind).as_str().to_string(),
            payload: e.payload,
        })
        .collect();

    match state
        .event_store
        .append_with_snapshot(
            &stream_id,
            request.expected_version,
            request.expected_etag.as_ref(),
            request.snapshot.clone(),
            events,
        )
        .await
    {
        Ok(()) => {
            info!(stream_id = %stream_id, "AFL apply accepted");
            state.hub.broadcast(
                "matchState",
                serde_json::json!({ "streamId": stream_id, "state": request.snapshot, "updatedAt": chrono::Utc::now() }),
            );
            match load_envelope(&state, &stream_id).await {
                Ok(envelope) => Json(envelope).into_response(),
                Err(e) => {
                    error!(error = %e, "failed to reload envelope after apply");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        Err(AppendError::Concurrency(msg)) => {
            (StatusCode::PRECONDITION_FAILED, Json(Problem { detail: msg })).into_response()
        }
        Err(e) => {
            error!(stream_id = %stream_id, error = %e, "AFL apply failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Problem { detail: e.to_string() })).into_response()
        }
    }
}
