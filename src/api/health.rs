//! Liveness & health (§2 "Supplemented features", out of scope per §1 but
//! named explicitly in §6).

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{memory::InMemoryStore, DocumentStore};

/// A lease untouched for longer than this is reported as stale: the
/// projector is either stuck or has never started.
const PROJECTOR_LEASE_STALE_AFTER: chrono::Duration = chrono::Duration::seconds(30);

#[derive(Clone)]
pub struct HealthAppState {
    pub store: InMemoryStore,
    pub leases_container: String,
    pub projector_lease_name: String,
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    store: &'static str,
    projector: &'static str,
}

pub fn create_health_router(state: HealthAppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

async fn liveness() -> &'static str {
    "FanRide backend running"
}

async fn health(State(state): State<Arc<HealthAppState>>) -> impl IntoResponse {
    // A trivial reachability probe: query an always-present container.
    let store_reachable = state.store.query_all("es").await.is_ok();

    let projector = match state
        .store
        .read_item(&state.leases_container, &state.projector_lease_name, &state.projector_lease_name)
        .await
    {
        Ok(doc) => match doc.body.get("updatedAt").and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok()) {
            Some(updated_at) if Utc::now() - updated_at > PROJECTOR_LEASE_STALE_AFTER => "stale",
            Some(_) => "active",
            None => "unknown",
        },
        // NotFound before the projector has committed its first batch is
        // expected right after startup, not a failure.
        Err(_) => "starting",
    };

    let status = if store_reachable && projector != "stale" { "ok" } else { "degraded" };
    let code = if status == "ok" { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        code,
        Json(HealthReport {
            status,
            store: if store_reachable { "reachable" } else { "unreachable" },
            projector,
        }),
    )
}
