use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::SharedRuntimeConfig;
use crate::readmodel::ReadModelQuery;

use super::protocol::ClientMessage;
use super::{ConnId, Hub, HubEvent};

/// Manages a single WebSocket connection on `/hub/match` (§4.F). Uses the
/// same tokio::select! read-and-broadcast loop shape as a
/// subscription-manager connection; the metrics-exclusion check replaces a
/// per-entity subscription set with a single excluded connection id.
pub struct HubConnection {
    id: ConnId,
}

impl HubConnection {
    pub fn new(id: ConnId) -> Self {
        Self { id }
    }

    pub async fn handle(
        self,
        mut socket: WebSocket,
        hub: Arc<Hub>,
        mut events: tokio::sync::broadcast::Receiver<HubEvent>,
        read_models: Arc<dyn ReadModelQuery>,
        runtime_config: SharedRuntimeConfig,
    ) {
        info!(conn_id = self.id, "hub connection established");

        loop {
            tokio::select! {
                incoming = socket.recv() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self
                                .handle_client_message(&mut socket, &text, &hub, &read_models, &runtime_config)
                                .await
                            {
                                error!(error = %e, "error handling hub client message");
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!(conn_id = self.id, "hub client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if socket.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "hub websocket error");
                            break;
                        }
                        None => break,
                    }
                }

                result = events.recv() => {
                    match result {
                        Ok(event) => {
                            if event.exclude == Some(self.id) {
                                continue;
                            }
                            let text = serde_json::to_string(&event.message).unwrap_or_default();
                            if socket.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "hub connection lagged, skipped broadcasts");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            error!("hub broadcast channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!(conn_id = self.id, "hub connection closed");
    }

    async fn handle_client_message(
        &self,
        socket: &mut WebSocket,
        text: &str,
        hub: &Hub,
        read_models: &Arc<dyn ReadModelQuery>,
        runtime_config: &SharedRuntimeConfig,
    ) -> anyhow::Result<()> {
        let msg: ClientMessage = serde_json::from_str(text)?;
        match msg {
            ClientMessage::SendMetrics { watts, cadence, heart_rate } => {
                hub.broadcast_except(
                    self.id,
                    "metrics",
                    json!({ "watts": watts, "cadence": cadence, "heartRate": heart_rate }),
                );
            }
            ClientMessage::SubscribeToStream { stream_id } => {
                if stream_id.is_empty() {
                    warn!("SubscribeToStream received with empty streamId");
                    return Ok(());
                }
                // Read live so an admin PUT changes this push without a
                // restart, same as the GET read-model endpoints (§2).
                let (momentum_window, leaderboard_top_k) = {
                    let cfg = runtime_config.read().expect("RuntimeConfig lock poisoned");
                    (cfg.momentum_window_points, cfg.leaderboard_top_k)
                };

                if let Some(state) = read_models.match_state_json(&stream_id).await {
                    self.push(socket, "matchState", state).await?;
                }
                if let Some(momentum) = read_models.momentum_json(&stream_id, momentum_window).await {
                    self.push(socket, "tesHistory", momentum).await?;
                }
                let leaderboard = read_models.leaderboard_json(leaderboard_top_k).await;
                self.push(socket, "leaderboard", leaderboard).await?;
            }
        }
        Ok(())
    }

    async fn push(&self, socket: &mut WebSocket, kind: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        let msg = super::protocol::ServerMessage::new(kind, payload);
        let text = serde_json::to_string(&msg)?;
        socket.send(Message::Text(text)).await?;
        Ok(())
    }
}
