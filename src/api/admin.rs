//! `GET`/`PUT /api/admin/config` (§2 ambient stack) — runtime-tunable knobs,
//! gated on `PUT` by a bearer token, with GET/PUT-with-partial-update
//! semantics.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::config::SharedRuntimeConfig;

#[derive(Clone)]
pub struct AdminAppState {
    pub runtime_config: SharedRuntimeConfig,
    /// Required bearer token for `PUT /api/admin/config`. `None` disables
    /// the check (dev mode).
    pub admin_token: Option<String>,
}

#[derive(Deserialize)]
pub struct RuntimeConfigUpdate {
    pub poll_interval_seconds: Option<u64>,
    pub momentum_window_points: Option<usize>,
    pub leaderboard_top_k: Option<usize>,
    pub body_size_limit_single_bytes: Option<usize>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn create_admin_router(state: AdminAppState) -> Router {
    Router::new()
        .route("/api/admin/config", get(get_config).put(put_config))
        .with_state(Arc::new(state))
}

async fn get_config(State(state): State<Arc<AdminAppState>>) -> Response {
    let cfg = state.runtime_config.read().expect("RuntimeConfig lock poisoned").clone();
    Json(cfg).into_response()
}

async fn put_config(
    State(state): State<Arc<AdminAppState>>,
    headers: HeaderMap,
    Json(update): Json<RuntimeConfigUpdate>,
) -> Response {
    if !validate_admin_token(&headers, &state.admin_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        )
            .into_response();
    }

    let mut cfg = state.runtime_config.write().expect("RuntimeConfig lock poisoned");
    if let Some(v) = update.poll_interval_seconds {
        cfg.poll_interval_seconds = v;
    }
    if let Some(v) = update.momentum_window_points {
        cfg.momentum_window_points = v;
    }
    if let Some(v) = update.leaderboard_top_k {
        cfg.leaderboard_top_k = v;
    }
    if let Some(v) = update.body_size_limit_single_bytes {
        cfg.body_size_limit_single_bytes = v;
    }

    Json(cfg.clone()).into_response()
}

/// Returns true if `expected` is `None` (unrestricted) or the request's
/// bearer token matches it.
fn validate_admin_token(headers: &HeaderMap, expected: &Option<String>) -> bool {
    let Some(expected_token) = expected else {
        return true;
    };
    match crate::auth::extract_bearer_token(headers) {
        Ok(token) => &token == expected_token,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::new_runtime_config;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app(admin_token: Option<String>) -> Router {
        create_admin_router(AdminAppState {
            runtime_config: new_runtime_config(),
            admin_token,
        })
    }

    #[tokio::test]
    async fn get_returns_defaults() {
        let app = test_app(None);
        let response = app
            .oneshot(Request::builder().uri("/api/admin/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let cfg: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(cfg["leaderboard_top_k"], 10);
    }

    #[tokio::test]
    async fn put_without_token_is_unauthorized_when_token_configured() {
        let app = test_app(Some("secret".to_string()));
        let body = json!({ "leaderboard_top_k": 25 });
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/admin/config")
                    .header("Content-Type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn put_with_valid_token_applies_partial_update() {
        let app = test_app(Some("secret".to_string()));
        let body = json!({ "leaderboard_top_k": 25 });
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/admin/config")
                    .header("Content-Type", "application/json")
                    .header("Authorization", "Bearer secret")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let cfg: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(cfg["leaderboard_top_k"], 25);
        assert_eq!(cfg["poll_interval_seconds"], 5);
    }
}
