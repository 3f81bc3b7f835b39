//! Component (C): the change-feed projector. A durable, lease-coordinated
//! consumer over the event container; every handler here MUST be idempotent
//! because delivery is at-least-once (§4.C, §9 "At-least-once change feed").

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{ProjectorMode, SharedRuntimeConfig};
use crate::hub::Hub;
use crate::readmodel::ReadModelService;
use crate::store::{DocumentStore, StartMode, StoreError};

/// Logical change-feed subscriber name; also read by `api::health` to find
/// the projector's lease document.
pub const PROJECTOR_NAME: &str = "projector";

#[derive(Clone)]
pub struct Projector<S: DocumentStore + Clone> {
    store: S,
    events_container: String,
    leases_container: String,
    match_state_container: String,
    tes_history_container: String,
    leaderboard_container: String,
    hub: Arc<Hub>,
    read_models: ReadModelService<S>,
    /// Read live on every `TrainerMetricsCaptured` event so an admin `PUT`
    /// changes the projector's broadcast window/top-K without a restart
    /// (§2 "Supplemented features").
    runtime_config: SharedRuntimeConfig,
}

impl<S: DocumentStore + Clone + 'static> Projector<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: S,
        events_container: impl Into<String>,
        leases_container: impl Into<String>,
        match_state_container: impl Into<String>,
        tes_history_container: impl Into<String>,
        leaderboard_container: impl Into<String>,
        hub: Arc<Hub>,
        runtime_config: SharedRuntimeConfig,
    ) -> Self {
        let match_state_container = match_state_container.into();
        let tes_history_container = tes_history_container.into();
        let leaderboard_container = leaderboard_container.into();
        let read_models = ReadModelService::new(
            store.clone(),
            match_state_container.clone(),
            tes_history_container.clone(),
            leaderboard_container.clone(),
        );
        Self {
            store,
            events_container: events_container.into(),
            leases_container: leases_container.into(),
            match_state_container,
            tes_history_container,
            leaderboard_container,
            hub,
            read_models,
            runtime_config,
        }
    }

    /// Runs until `cancel` fires (§5 "Cancellation & shutdown" — stops the
    /// subscription; the lease is never advanced past the last fully
    /// handled batch).
    pub async fn run(self: Arc<Self>, mode: ProjectorMode, mut cancel: watch::Receiver<bool>) {
        if mode == ProjectorMode::Rebuild {
            if let Err(e) = self.store.purge_leases(&self.leases_container, PROJECTOR_NAME).await {
                warn!(error = %e, "failed to purge projector leases before rebuild");
            }
            info!("projector rebuilding read models from the beginning");
        }

        let start_mode = match mode {
            ProjectorMode::Rebuild => StartMode::FromBeginning,
            ProjectorMode::Live => StartMode::FromNow,
        };

        let mut rx = match self
            .store
            .change_feed(&self.events_container, &self.leases_container, PROJECTOR_NAME, start_mode)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "projector failed to subscribe to change feed");
                return;
            }
        };

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("projector stopping on cancellation");
                        return;
                    }
                }
                batch = rx.recv() => {
                    let Some(batch) = batch else {
                        info!("projector change-feed channel closed");
                        return;
                    };
                    let ok = self.handle_batch(&batch.docs).await;
                    let _ = batch.ack.send(ok);
                }
            }
        }
    }

    async fn handle_batch(&self, docs: &[Value]) -> bool {
        for doc in docs {
            if let Err(e) = self.handle_doc(doc).await {
                warn!(error = %e, "projector handler failed, batch will be redelivered");
                return false;
            }
        }
        true
    }

    async fn handle_doc(&self, doc: &Value) -> anyhow::Result<()> {
        match doc.get("type").and_then(Value::as_str) {
            Some("snapshot") => self.handle_snapshot(doc).await,
            Some("event") => self.handle_event(doc).await,
            Some("outbox") => self.handle_outbox(doc).await,
            _ => Ok(()),
        }
    }

    async fn handle_snapshot(&self, doc: &Value) -> anyhow::Result<()> {
        let stream_id = doc
            .get("streamId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("snapshot document missing streamId"))?;

        let row = json!({
            "id": stream_id,
            "streamId": stream_id,
            "state": doc.get("state").cloned().unwrap_or(Value::Null),
            "aggVersion": doc.get("aggVersion").cloned().unwrap_or(json!(0)),
            "updatedAt": Utc::now(),
        });
        self.store.upsert_item(&self.match_state_container, stream_id, row).await?;

        if let Some(state) = self.read_models.get_match_state(stream_id).await {
            self.hub.broadcast("matchState", serde_json::to_value(state)?);
        }
        Ok(())
    }

    async fn handle_event(&self, doc: &Value) -> anyhow::Result<()> {
        if doc.get("kind").and_then(Value::as_str) != Some("TrainerMetricsCaptured") {
            return Ok(());
        }
        let stream_id = doc
            .get("streamId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("event document missing streamId"))?;
        let seq = doc.get("seq").and_then(Value::as_u64).unwrap_or(0);
        let data = doc.get("data").cloned().unwrap_or(Value::Null);
        let ts = doc.get("ts").cloned().unwrap_or_else(|| json!(Utc::now()));

        let momentum_row = json!({
            "id": format!("{stream_id}-{seq}"),
            "streamId": stream_id,
            "metrics": data,
            "ts": ts,
        });
        self.store
            .upsert_item(&self.tes_history_container, stream_id, momentum_row)
            .await?;

        let leaderboard_row = json!({
            "id": stream_id,
            "streamId": stream_id,
            "metrics": data,
            "updatedAt": Utc::now(),
        });
        self.store
            .upsert_item(&self.leaderboard_container, stream_id, leaderboard_row)
            .await?;

        let (momentum_window, leaderboard_top_k) = {
            let cfg = self.runtime_config.read().expect("RuntimeConfig lock poisoned");
            (cfg.momentum_window_points, cfg.leaderboard_top_k)
        };

        if let Some(momentum) = self.read_models.get_momentum(stream_id, momentum_window).await {
            self.hub.broadcast("tesHistory", serde_json::to_value(momentum)?);
        }
        let leaderboard = self.read_models.get_leaderboard(leaderboard_top_k).await;
        self.hub.broadcast("leaderboard", serde_json::to_value(leaderboard)?);
        Ok(())
    }

    async fn handle_outbox(&self, doc: &Value) -> anyhow::Result<()> {
        if doc.get("kind").and_then(Value::as_str) != Some("trainerEffect") {
            return Ok(());
        }
        let stream_id = doc
            .get("streamId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("outbox document missing streamId"))?;
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("outbox document missing id"))?;

        self.hub.broadcast(
            "trainerEffect",
            doc.get("payload").cloned().unwrap_or(Value::Null),
        );

        match self
            .store
            .patch_item(&self.events_container, id, stream_id, json!({ "processedAt": Utc::now() }))
            .await
        {
            Ok(()) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
