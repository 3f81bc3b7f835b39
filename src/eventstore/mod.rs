//! Component (B): per-stream append-only event store built on top of the
//! document store's transactional batch (§4.B). Validate, then commit
//! atomically — but the atomicity here is delegated entirely to (A) rather
//! than an in-process mutex (§9 "Optimistic concurrency without in-process
//! locking").

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{outbox_id_for, outbox_kind_for, snapshot_id_for, DocType, NewEvent};
use crate::store::{BatchOp, DocumentStore, Etag, StoreError};

pub const DEFAULT_CONTAINER_EVENTS: &str = "es";

/// Errors surfaced by `AppendWithSnapshot` (§4.B, §7).
#[derive(Debug, Error, Clone)]
pub enum AppendError {
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    #[error("store unavailable: {0}")]
    Transient(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<StoreError> for AppendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PreconditionFailed(msg) | StoreError::Conflict(msg) => {
                AppendError::Concurrency(msg)
            }
            StoreError::Throttled => AppendError::Transient("throttled".to_string()),
            StoreError::Transient(msg) => AppendError::Transient(msg),
            StoreError::NotFound => AppendError::Fatal("snapshot not found mid-batch".to_string()),
            StoreError::Fatal(msg) => AppendError::Fatal(msg),
        }
    }
}

/// An event store bound to a single document-store instance, sharing the
/// event container across every stream (partitioned by `streamId`).
#[derive(Clone)]
pub struct EventStore<S: DocumentStore> {
    store: S,
    container: String,
}

impl<S: DocumentStore> EventStore<S> {
    pub fn new(store: S, container: impl Into<String>) -> Self {
        Self {
            store,
            container: container.into(),
        }
    }

    /// Atomically appends `events` to `stream_id`, upserts the new snapshot,
    /// and creates any outbox side effects, guarded by optimistic
    /// concurrency on the snapshot (§4.B).
    pub async fn append_with_snapshot(
        &self,
        stream_id: &str,
        expected_version: u64,
        expected_etag: Option<&Etag>,
        snapshot_state: Value,
        events: Vec<NewEvent>,
    ) -> Result<(), AppendError> {
        let snapshot_id = snapshot_id_for(stream_id);
        let mut ops = Vec::with_capacity(2 + events.len() * 2);

        // Step 1: optimistic guard on the snapshot.
        let guard_stub = json!({
            "id": snapshot_id,
            "type": DocType::Snapshot,
            "streamId": stream_id,
        });
        match expected_etag {
            Some(etag) => ops.push(BatchOp::Replace {
                id: snapshot_id.clone(),
                body: guard_stub,
                if_match: etag.clone(),
            }),
            None => ops.push(BatchOp::Create {
                id: snapshot_id.clone(),
                body: guard_stub,
            }),
        }

        // Step 2: event creates, seq = expected_version+1..expected_version+len.
        let now = Utc::now();
        for (i, event) in events.iter().enumerate() {
            let seq = expected_version + 1 + i as u64;
            ops.push(BatchOp::Create {
                id: event.id.clone(),
                body: json!({
                    "id": event.id,
                    "type": DocType::Event,
                    "streamId": stream_id,
                    "seq": seq,
                    "kind": event.kind,
                    "data": event.payload,
                    "ts": now,
                }),
            });
        }

        // Step 3: snapshot upsert — overwrites the guard stub from step 1.
        let new_version = expected_version + events.len() as u64;
        ops.push(BatchOp::Upsert {
            id: snapshot_id.clone(),
            body: json!({
                "id": snapshot_id,
                "type": DocType::Snapshot,
                "streamId": stream_id,
                "aggVersion": new_version,
                "state": snapshot_state,
                "updatedAt": now,
            }),
        });

        // Step 4: outbox creates for events with an implied external effect.
        for event in &events {
            if let Some(outbox_kind) = outbox_kind_for(&event.kind) {
                ops.push(BatchOp::Create {
                    id: outbox_id_for(&event.id),
                    body: json!({
                        "id": outbox_id_for(&event.id),
                        "type": DocType::Outbox,
                        "streamId": stream_id,
                        "kind": outbox_kind,
                        "payload": event.payload,
                        "ts": now,
                    }),
                });
            }
        }

        match self.store.execute_batch(&self.container, stream_id, ops).await {
            Ok(()) => {
                info!(stream_id, new_version, event_count = events.len(), "appended");
                Ok(())
            }
            Err(e @ (StoreError::PreconditionFailed(_) | StoreError::Conflict(_))) => {
                warn!(stream_id, error = %e, "append rejected by concurrency guard");
                Err(e.into())
            }
            Err(e) => {
                warn!(stream_id, error = %e, "append failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn sample_event(kind: &str) -> NewEvent {
        NewEvent {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            payload: json!({ "score": { "home": 1, "away": 0 } }),
        }
    }

    #[tokio::test]
    async fn fresh_stream_append_creates_contiguous_events_and_snapshot() {
        let es = EventStore::new(InMemoryStore::new(), "es");
        let events = vec![sample_event("MatchStateUpdated")];
        es.append_with_snapshot(
            "m1",
            0,
            None,
            json!({ "score": { "home": 1, "away": 0 }, "quarter": 1, "clock": "10:00" }),
            events.clone(),
        )
        .await
        .unwrap();

        let snap = es.store.read_item(&es.container, "snap-m1", "m1").await.unwrap();
        assert_eq!(snap.body["aggVersion"], 1);

        let event_doc = es
            .store
            .read_item(&es.container, &events[0].id, "m1")
            .await
            .unwrap();
        assert_eq!(event_doc.body["seq"], 1);
    }

    #[tokio::test]
    async fn second_create_with_no_etag_conflicts() {
        let es = EventStore::new(InMemoryStore::new(), "es");
        es.append_with_snapshot("m1", 0, None, json!({}), vec![sample_event("MatchStateUpdated")])
            .await
            .unwrap();

        let err = es
            .append_with_snapshot("m1", 0, None, json!({}), vec![sample_event("MatchStateUpdated")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppendError::Concurrency(_)));
    }

    #[tokio::test]
    async fn stale_etag_is_rejected_and_fresh_etag_succeeds() {
        let es = EventStore::new(InMemoryStore::new(), "es");
        es.append_with_snapshot("m1", 0, None, json!({}), vec![sample_event("MatchStateUpdated")])
            .await
            .unwrap();

        let snap = es.store.read_item(&es.container, "snap-m1", "m1").await.unwrap();

        let stale_err = es
            .append_with_snapshot(
                "m1",
                1,
                Some(&"not-the-real-etag".to_string()),
                json!({}),
                vec![sample_event("MatchStateUpdated")],
            )
            .await
            .unwrap_err();
        assert!(matches!(stale_err, AppendError::Concurrency(_)));

        es.append_with_snapshot("m1", 1, Some(&snap.etag), json!({}), vec![sample_event("MatchStateUpdated")])
            .await
            .unwrap();

        let snap2 = es.store.read_item(&es.container, "snap-m1", "m1").await.unwrap();
        assert_eq!(snap2.body["aggVersion"], 2);
    }

    #[tokio::test]
    async fn trainer_metrics_event_creates_outbox() {
        let es = EventStore::new(InMemoryStore::new(), "es");
        let event = sample_event("TrainerMetricsCaptured");
        let event_id = event.id.clone();
        es.append_with_snapshot("m1", 0, None, json!({}), vec![event]).await.unwrap();

        let outbox = es
            .store
            .read_item(&es.container, &outbox_id_for(&event_id), "m1")
            .await
            .unwrap();
        assert_eq!(outbox.body["kind"], "trainerEffect");
    }

    #[tokio::test]
    async fn match_state_event_does_not_create_outbox() {
        let es = EventStore::new(InMemoryStore::new(), "es");
        let event = sample_event("MatchStateUpdated");
        let event_id = event.id.clone();
        es.append_with_snapshot("m1", 0, None, json!({}), vec![event]).await.unwrap();

        let err = es
            .store
            .read_item(&es.container, &outbox_id_for(&event_id), "m1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
