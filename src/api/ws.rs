//! `GET /hub/match` — WebSocket upgrade for the push hub (§4.F, §6). Unlike
//! a tenant-scoped API, the hub carries no auth middleware: it is a
//! read-and-metrics-relay surface, not a tenant boundary.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::info;

use crate::config::SharedRuntimeConfig;
use crate::hub::{Hub, HubConnection};
use crate::readmodel::ReadModelQuery;

#[derive(Clone)]
pub struct WsAppState {
    pub hub: Arc<Hub>,
    pub read_models: Arc<dyn ReadModelQuery>,
    pub runtime_config: SharedRuntimeConfig,
}

pub fn create_ws_router(state: WsAppState) -> Router {
    Router::new().route("/hub/match", get(ws_handler)).with_state(Arc::new(state))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsAppState>>) -> Response {
    info!("hub websocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<WsAppState>) {
    let (id, events) = state.hub.register();
    HubConnection::new(id)
        .handle(
            socket,
            Arc::clone(&state.hub),
            events,
            Arc::clone(&state.read_models),
            Arc::clone(&state.runtime_config),
        )
        .await;
}
