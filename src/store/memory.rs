//! In-memory `DocumentStore` implementation backed by `DashMap`, a
//! lock-free concurrent map well suited to holding world state under
//! concurrent access. Stands in for a partitioned, strongly-consistent
//! document store: every document carries an explicit partition key and a
//! monotonically increasing ETag, and every container keeps a commit-ordered
//! log that the change-feed subscriber tails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use dashmap::DashMap;

use super::{BatchOp, ChangeFeedBatch, DocumentStore, Etag, StartMode, StoreError, StoreResult, StoredDoc};

const CHANGE_FEED_BATCH_SIZE: usize = 32;
const CHANGE_FEED_POLL_INTERVAL: Duration = Duration::from_millis(25);
const CHANGE_FEED_REDELIVERY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
struct StoredValue {
    body: Value,
    etag: Etag,
    partition_key: String,
}

#[derive(Default)]
struct ContainerState {
    docs: std::collections::HashMap<String, StoredValue>,
    /// Append order of every create/upsert/replace, oldest first — the
    /// change feed's commit-order log.
    log: Vec<Value>,
}

/// Cheap to clone: every field is an `Arc`.
#[derive(Clone)]
pub struct InMemoryStore {
    containers: Arc<DashMap<String, Mutex<ContainerState>>>,
    etag_counter: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            containers: Arc::new(DashMap::new()),
            etag_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_etag(&self) -> Etag {
        self.etag_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn extract_id(body: &Value) -> StoreResult<String> {
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Fatal("document is missing an 'id' field".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn read_item(&self, container: &str, id: &str, partition_key: &str) -> StoreResult<StoredDoc> {
        let entry = self.containers.get(container).ok_or(StoreError::NotFound)?;
        let state = entry.lock().unwrap();
        let stored = state.docs.get(id).ok_or(StoreError::NotFound)?;
        if stored.partition_key != partition_key {
            return Err(StoreError::NotFound);
        }
        Ok(StoredDoc {
            body: stored.body.clone(),
            etag: stored.etag.clone(),
        })
    }

    async fn upsert_item(&self, container: &str, partition_key: &str, body: Value) -> StoreResult<Etag> {
        let id = Self::extract_id(&body)?;
        let etag = self.next_etag();
        let entry = self.containers.entry(container.to_string()).or_default();
        let mut state = entry.lock().unwrap();
        state.docs.insert(
            id,
            StoredValue {
                body: body.clone(),
                etag: etag.clone(),
                partition_key: partition_key.to_string(),
            },
        );
        state.log.push(body);
        Ok(etag)
    }

    async fn patch_item(&self, container: &str, id: &str, partition_key: &str, patch: Value) -> StoreResult<()> {
        let entry = self.containers.get(container).ok_or(StoreError::NotFound)?;
        let mut state = entry.lock().unwrap();
        let stored = state.docs.get(id).ok_or(StoreError::NotFound)?;
        if stored.partition_key != partition_key {
            return Err(StoreError::NotFound);
        }
        let mut merged = stored.body.clone();
        merge_json(&mut merged, &patch);
        let etag = self.next_etag();
        let pk = stored.partition_key.clone();
        state.docs.insert(
            id.to_string(),
            StoredValue {
                body: merged.clone(),
                etag,
                partition_key: pk,
            },
        );
        state.log.push(merged);
        Ok(())
    }

    async fn execute_batch(&self, container: &str, partition_key: &str, ops: Vec<BatchOp>) -> StoreResult<()> {
        let entry = self.containers.entry(container.to_string()).or_default();
        let mut state = entry.lock().unwrap();

        // Validate and apply against a scratch copy first: either every
        // operation in the batch lands, or none does (§4.A).
        let mut scratch = state.docs.clone();
        let mut pending_log = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                BatchOp::Create { id, body } => {
                    if scratch.contains_key(&id) {
                        return Err(StoreError::Conflict(format!(
                            "document '{id}' already exists"
                        )));
                    }
                    let etag = self.next_etag();
                    scratch.insert(
                        id,
                        StoredValue {
                            body: body.clone(),
                            etag,
                            partition_key: partition_key.to_string(),
                        },
                    );
                    pending_log.push(body);
                }
                BatchOp::Upsert { id, body } => {
                    let etag = self.next_etag();
                    scratch.insert(
                        id,
                        StoredValue {
                            body: body.clone(),
                            etag,
                            partition_key: partition_key.to_string(),
                        },
                    );
                    pending_log.push(body);
                }
                BatchOp::Replace { id, body, if_match } => {
                    match scratch.get(&id) {
                        None => return Err(StoreError::PreconditionFailed(format!(
                            "'{id}' does not exist"
                        ))),
                        Some(current) if current.etag != if_match => {
                            return Err(StoreError::PreconditionFailed(format!(
                                "etag mismatch for '{id}'"
                            )));
                        }
                        Some(_) => {}
                    }
                    let etag = self.next_etag();
                    scratch.insert(
                        id,
                        StoredValue {
                            body: body.clone(),
                            etag,
                            partition_key: partition_key.to_string(),
                        },
                    );
                    pending_log.push(body);
                }
            }
        }

        state.docs = scratch;
        state.log.extend(pending_log);
        Ok(())
    }

    async fn query_partition(&self, container: &str, partition_key: &str) -> StoreResult<Vec<Value>> {
        let Some(entry) = self.containers.get(container) else {
            return Ok(Vec::new());
        };
        let state = entry.lock().unwrap();
        Ok(state
            .docs
            .values()
            .filter(|v| v.partition_key == partition_key)
            .map(|v| v.body.clone())
            .collect())
    }

    async fn query_all(&self, container: &str) -> StoreResult<Vec<Value>> {
        let Some(entry) = self.containers.get(container) else {
            return Ok(Vec::new());
        };
        let state = entry.lock().unwrap();
        Ok(state.docs.values().map(|v| v.body.clone()).collect())
    }

    async fn change_feed(
        &self,
        container: &str,
        lease_container: &str,
        name: &str,
        start_mode: StartMode,
    ) -> StoreResult<mpsc::Receiver<ChangeFeedBatch>> {
        let (tx, rx) = mpsc::channel(4);
        let store = self.clone();
        let container = container.to_string();
        let lease_container = lease_container.to_string();
        let name = name.to_string();

        tokio::spawn(async move {
            let mut cursor = match store.read_item(&lease_container, &name, &name).await {
                Ok(doc) => doc.body.get("cursor").and_then(Value::as_u64).unwrap_or(0),
                Err(StoreError::NotFound) => match start_mode {
                    StartMode::FromBeginning => 0,
                    StartMode::FromNow => store.log_len(&container),
                },
                Err(e) => {
                    warn!(error = %e, "failed to read change-feed lease, starting from beginning");
                    0
                }
            };

            loop {
                let len = store.log_len(&container);
                if cursor >= len {
                    sleep(CHANGE_FEED_POLL_INTERVAL).await;
                    continue;
                }

                let end = len.min(cursor + CHANGE_FEED_BATCH_SIZE as u64);
                let docs = store.log_slice(&container, cursor, end);

                let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
                if tx.send(ChangeFeedBatch { docs, ack: ack_tx }).await.is_err() {
                    debug!(container = %container, "change-feed receiver dropped, stopping subscriber");
                    return;
                }

                match ack_rx.await {
                    Ok(true) => {
                        cursor = end;
                        let _ = store
                            .upsert_item(
                                &lease_container,
                                &name,
                                json!({ "id": name, "cursor": cursor, "updatedAt": chrono::Utc::now() }),
                            )
                            .await;
                    }
                    Ok(false) | Err(_) => {
                        // Handler failed or was dropped mid-flight: the lease
                        // doesn't advance, so the same batch is redelivered.
                        sleep(CHANGE_FEED_REDELIVERY_DELAY).await;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn purge_leases(&self, lease_container: &str, name: &str) -> StoreResult<()> {
        if let Some(entry) = self.containers.get(lease_container) {
            let mut state = entry.lock().unwrap();
            state.docs.remove(name);
        }
        Ok(())
    }
}

impl InMemoryStore {
    fn log_len(&self, container: &str) -> u64 {
        match self.containers.get(container) {
            Some(entry) => entry.lock().unwrap().log.len() as u64,
            None => 0,
        }
    }

    fn log_slice(&self, container: &str, start: u64, end: u64) -> Vec<Value> {
        match self.containers.get(container) {
            Some(entry) => {
                let state = entry.lock().unwrap();
                state.log[start as usize..end as usize].to_vec()
            }
            None => Vec::new(),
        }
    }
}

/// Minimal JSON merge-patch (RFC 7386): objects merge key-wise, `null`
/// removes a key, anything else replaces wholesale.
fn merge_json(target: &mut Value, patch: &Value) {
    if let (Value::Object(target_map), Value::Object(patch_map)) = (&mut *target, patch) {
        for (k, v) in patch_map {
            if v.is_null() {
                target_map.remove(k);
            } else {
                merge_json(target_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    } else {
        *target = patch.clone();
    }
}
