//! `GET /api/readmodels/tes/{streamId}` and `GET /api/readmodels/leaderboard`
//! (§6) — pull variants of the momentum and leaderboard views the hub also
//! pushes on subscribe.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};

use crate::config::SharedRuntimeConfig;
use crate::readmodel::ReadModelService;
use crate::store::memory::InMemoryStore;

#[derive(Clone)]
pub struct ReadModelsAppState {
    pub read_models: ReadModelService<InMemoryStore>,
    pub runtime_config: SharedRuntimeConfig,
}

pub fn create_readmodels_router(state: ReadModelsAppState) -> Router {
    Router::new()
        .route("/api/readmodels/tes/:stream_id", get(get_tes_history))
        .route("/api/readmodels/leaderboard", get(get_leaderboard))
        .with_state(Arc::new(state))
}

async fn get_tes_history(State(state): State<Arc<ReadModelsAppState>>, Path(stream_id): Path<String>) -> Response {
    let window = state.runtime_config.read().unwrap().momentum_window_points;
    match state.read_models.get_momentum(&stream_id, window).await {
        Some(view) => Json(view).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_leaderboard(State(state): State<Arc<ReadModelsAppState>>) -> Response {
    let top_k = state.runtime_config.read().unwrap().leaderboard_top_k;
    Json(state.read_models.get_leaderboard(top_k).await).into_response()
}
