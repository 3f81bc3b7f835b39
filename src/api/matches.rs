//! `GET /api/matches/{streamId}` and `POST /api/matches/{streamId}/events`
//! (§6). Follows a body-size-then-validate-then-publish pipeline.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::SharedRuntimeConfig;
use crate::eventstore::{AppendError, EventStore};
use crate::hub::Hub;
use crate::model::{snapshot_id_for, EventKind, NewEvent};
use crate::store::{memory::InMemoryStore, DocumentStore, StoreError};

#[derive(Clone)]
pub struct MatchesAppState {
    pub store: InMemoryStore,
    pub events_container: String,
    pub event_store: EventStore<InMemoryStore>,
    pub hub: Arc<Hub>,
    pub runtime_config: SharedRuntimeConfig,
}

#[derive(Deserialize)]
pub struct AppendRequest {
    #[serde(rename = "expectedVersion")]
    pub expected_version: u64,
    #[serde(rename = "expectedEtag", default)]
    pub expected_etag: Option<String>,
    pub snapshot: Value,
    pub events: Vec<AppendEventBody>,
}

#[derive(Deserialize, Clone)]
pub struct AppendEventBody {
    pub id: String,
    pub kind: String,
    pub payload: Value,
}

#[derive(Serialize)]
struct Problem {
    detail: String,
}

pub fn create_matches_router(state: MatchesAppState) -> Router {
    Router::new()
        .route("/api/matches/:stream_id", get(get_match_state))
        .route("/api/matches/:stream_id/events", post(append_events))
        .with_state(Arc::new(state))
}

async fn get_match_state(
    State(state): State<Arc<MatchesAppState>>,
    Path(stream_id): Path<String>,
) -> Response {
    match state
        .store
        .read_item(&state.events_container, &snapshot_id_for(&stream_id), &stream_id)
        .await
    {
        Ok(doc) => Json(doc.body.get("state").cloned().unwrap_or(Value::Null)).into_response(),
        Err(StoreError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(error = %e, "failed to read match state");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn append_events(
    State(state): State<Arc<MatchesAppState>>,
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
            info!(stream_id = %stream_id, "append accepted");
            state.hub.broadcast(
                "matchState",
                serde_json::json!({ "streamId": stream_id, "state": request.snapshot, "updatedAt": Utc::now() }),
            );
            StatusCode::ACCEPTED.into_response()
        }
        Err(AppendError::Concurrency(msg)) => {
            (StatusCode::PRECONDITION_FAILED, Json(Problem { detail: msg })).into_response()
        }
        Err(e) => {
            error!(stream_id = %stream_id, error = %e, "append failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Problem { detail: e.to_string() })).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::new_runtime_config;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let store = InMemoryStore::new();
        let event_store = EventStore::new(store.clone(), "es");
        create_matches_router(MatchesAppState {
            store,
            events_container: "es".to_string(),
            event_store,
            hub: Arc::new(Hub::new()),
            runtime_config: new_runtime_config(),
        })
    }

    #[tokio::test]
    async fn missing_stream_returns_404() {
        let app = test_app();
        let response = app
            .oneshot(Request::builder().uri("/api/matches/none").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fresh_append_then_read_round_trips() {
        let app = test_app();
        let body = serde_json::json!({
            "expectedVersion": 0,
            "expectedEtag": null,
            "snapshot": { "score": { "home": 0, "away": 1 }, "quarter": 1, "clock": "01:23" },
            "events": [{ "id": "e1", "kind": "MatchStateUpdated", "payload": {} }],
        });

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/matches/m1/events")
                    .header("Content-Type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .oneshot(Request::builder().uri("/api/matches/m1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let state: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(state["score"]["away"], 1);
    }

    #[tokio::test]
    async fn version_conflict_returns_412() {
        let app = test_app();
        let body = serde_json::json!({
            "expectedVersion": 0,
            "expectedEtag": null,
            "snapshot": {},
            "events": [{ "id": "e1", "kind": "MatchStateUpdated", "payload": {} }],
        });

        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/matches/m1/events")
                    .header("Content-Type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/matches/m1/events")
                    .header("Content-Type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn lowercase_kind_still_creates_outbox_entry() {
        let store = InMemoryStore::new();
        let event_store = EventStore::new(store.clone(), "es");
        let app = create_matches_router(MatchesAppState {
            store: store.clone(),
            events_container: "es".to_string(),
            event_store,
            hub: Arc::new(Hub::new()),
            runtime_config: new_runtime_config(),
        });

        let body = serde_json::json!({
            "expectedVersion": 0,
            "expectedEtag": null,
            "snapshot": {},
            "events": [{ "id": "e1", "kind": "trainermetricscaptured", "payload": { "watts": 250.0 } }],
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/matches/m1/events")
                    .header("Content-Type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let outbox = store.read_item("es", &crate::model::outbox_id_for("e1"), "m1").await.unwrap();
        assert_eq!(outbox.body["kind"], "trainerEffect");
    }
}
