//! Component (A): a thin typed surface over a partitioned JSON document
//! store (§4.A). This module defines the capability contract; `memory`
//! provides an in-process implementation backed by `DashMap`, standing in
//! for a real Cosmos-DB-style deployment so the rest of the pipeline can be
//! exercised without network I/O.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub type Etag = String;

/// Error taxonomy surfaced to callers (§4.A, §7).
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("throttled")]
    Throttled,
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("fatal store error: {0}")]
    Fatal(String),
}

impl StoreError {
    /// `Throttled`/`Transient` are retried inside the adapter with bounded
    /// backoff (§5 "Retries & backoff"); other kinds are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Throttled | StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A document read back together with its opaque ETag.
#[derive(Clone, Debug)]
pub struct StoredDoc {
    pub body: Value,
    pub etag: Etag,
}

/// One operation inside a `TransactionalBatch` (§4.A).
#[derive(Clone, Debug)]
pub enum BatchOp {
    Create { id: String, body: Value },
    Upsert { id: String, body: Value },
    Replace { id: String, body: Value, if_match: Etag },
}

/// Where a fresh change-feed subscription should begin when no lease exists
/// yet for its `name` (§4.A, §4.C).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartMode {
    FromBeginning,
    FromNow,
}

/// A batch of documents delivered to a change-feed handler. The handler
/// acks `true` once every document in the batch has been durably handled;
/// the lease only advances after a positive ack, so an ack of `false` (or a
/// dropped sender) causes the same batch to be redelivered (§4.A, §4.C).
pub struct ChangeFeedBatch {
    pub docs: Vec<Value>,
    pub ack: oneshot::Sender<bool>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_item(&self, container: &str, id: &str, partition_key: &str)
        -> StoreResult<StoredDoc>;

    async fn upsert_item(&self, container: &str, partition_key: &str, body: Value)
        -> StoreResult<Etag>;

    /// Applies a JSON-merge patch. NotFound is tolerated by callers (§3,
    /// §4.C outbox `processedAt` patching).
    async fn patch_item(&self, container: &str, id: &str, partition_key: &str, patch: Value)
        -> StoreResult<()>;

    /// Executes `ops` against a single partition atomically: either every
    /// operation applies, or none does (§4.A, §4.B).
    async fn execute_batch(&self, container: &str, partition_key: &str, ops: Vec<BatchOp>)
        -> StoreResult<()>;

    /// All documents currently stored for `partition_key` within `container`,
    /// for point/range queries (§4.D).
    async fn query_partition(&self, container: &str, partition_key: &str) -> StoreResult<Vec<Value>>;

    /// Every document in `container`, across partitions (used by the
    /// leaderboard's cross-stream top-K query, §4.D).
    async fn query_all(&self, container: &str) -> StoreResult<Vec<Value>>;

    /// Subscribes to `container`'s change feed, using `lease_container` to
    /// durably track the cursor under `name`. Delivers at-least-once, in
    /// commit order within a partition (§4.A, §4.C).
    async fn change_feed(
        &self,
        container: &str,
        lease_container: &str,
        name: &str,
        start_mode: StartMode,
    ) -> StoreResult<mpsc::Receiver<ChangeFeedBatch>>;

    /// Deletes every lease document under `name`; the next `change_feed`
    /// call for that name starts `FromBeginning` (§4.C "Rebuild" mode).
    async fn purge_leases(&self, lease_container: &str, name: &str) -> StoreResult<()>;
}
