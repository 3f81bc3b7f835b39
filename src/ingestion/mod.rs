//! Component (E): the ingestion worker. Polls an external feed, compares to
//! the last snapshot, and appends an idempotent `MatchStateUpdated` event on
//! change (§4.E).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SharedRuntimeConfig;
use crate::eventstore::{AppendError, EventStore};
use crate::hub::Hub;
use crate::model::{snapshot_id_for, NewEvent};
use crate::store::{DocumentStore, StoreError};

const CONCURRENCY_RETRY_ATTEMPTS: u32 = 2;
const CONCURRENCY_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Abstracts the external sports feed so the retry/comparison logic can be
/// tested without network I/O.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self) -> Option<Value>;
}

/// Polls an HTTP endpoint returning the aggregate-state JSON shape
/// (`{score:{home,away}, quarter, clock}`), optionally authenticated with a
/// static API-key header (grounded on `connector-manager`'s `GitHubClient`).
pub struct HttpFeedFetcher {
    client: Client,
    endpoint: String,
    api_key_header: Option<String>,
    api_key: Option<String>,
}

impl HttpFeedFetcher {
    pub fn new(endpoint: String, api_key_header: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key_header,
            api_key,
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self) -> Option<Value> {
        let mut req = self.client.get(&self.endpoint);
        if let (Some(header), Some(key)) = (&self.api_key_header, &self.api_key) {
            req = req.header(header.as_str(), key.as_str());
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "feed fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "feed returned non-2xx");
            return None;
        }
        match response.json::<Value>().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "feed response parse failure");
                None
            }
        }
    }
}

pub struct IngestionWorker<S: DocumentStore + Clone, F: FeedFetcher> {
    store: S,
    events_container: String,
    event_store: EventStore<S>,
    fetcher: F,
    hub: Arc<Hub>,
    stream_id: String,
}

impl<S: DocumentStore + Clone, F: FeedFetcher> IngestionWorker<S, F> {
    pub fn new(
        store: S,
        events_container: impl Into<String>,
        fetcher: F,
        hub: Arc<Hub>,
        stream_id: impl Into<String>,
    ) -> Self {
        let events_container = events_container.into();
        let event_store = EventStore::new(store.clone(), events_container.clone());
        Self {
            store,
            events_container,
            event_store,
            fetcher,
            hub,
            stream_id: stream_id.into(),
        }
    }

    /// Runs until `cancel` fires, re-reading `poll_interval_seconds` from
    /// `runtime_config` before every sleep so an admin `PUT` takes effect on
    /// the worker's very next iteration rather than requiring a restart
    /// (§2 "Supplemented features", §4.E step 5).
    pub async fn run(&self, runtime_config: SharedRuntimeConfig, mut cancel: watch::Receiver<bool>) {
        loop {
            self.run_once().await;

            let poll_interval = Duration::from_secs(
                runtime_config.read().expect("RuntimeConfig lock poisoned").poll_interval_seconds,
            );
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!(stream_id = %self.stream_id, "ingestion worker stopping on cancellation");
                        return;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// One iteration: fetch, compare, append-with-retry (§4.E).
    pub async fn run_once(&self) {
        let Some(fetched) = self.fetcher.fetch().await else {
            return;
        };

        let snapshot_id = snapshot_id_for(&self.stream_id);
        let current = self
            .store
            .read_item(&self.events_container, &snapshot_id, &self.stream_id)
            .await;

        let (expected_version, expected_etag, current_state) = match current {
            Ok(doc) => (
                doc.body.get("aggVersion").and_then(Value::as_u64).unwrap_or(0),
                Some(doc.etag),
                doc.body.get("state").cloned().unwrap_or(Value::Null),
            ),
            Err(StoreError::NotFound) => (0, None, Value::Null),
            Err(e) => {
                warn!(stream_id = %self.stream_id, error = %e, "failed to read snapshot for comparison");
                return;
            }
        };

        if fetched == current_state {
            return;
        }

        let mut version = expected_version;
        let mut etag = expected_etag;
        let mut remaining = CONCURRENCY_RETRY_ATTEMPTS;

        loop {
            let event = NewEvent {
                id: Uuid::new_v4().to_string(),
                kind: "MatchStateUpdated".to_string(),
                payload: fetched.clone(),
            };

            match self
                .event_store
                .append_with_snapshot(&self.stream_id, version, etag.as_ref(), fetched.clone(), vec![event])
                .await
            {
                Ok(()) => {
                    info!(stream_id = %self.stream_id, "ingested feed update");
                    self.hub.broadcast(
                        "matchState",
                        json!({
                            "streamId": self.stream_id,
                            "state": fetched,
                            "updatedAt": Utc::now(),
                        }),
                    );
                    return;
                }
                Err(AppendError::Concurrency(msg)) => {
                    if remaining == 0 {
                        warn!(stream_id = %self.stream_id, error = %msg, "ingestion gave up after concurrency retries");
                        return;
                    }
                    remaining -= 1;
                    tokio::time::sleep(CONCURRENCY_RETRY_DELAY).await;

                    match self
                        .store
                        .read_item(&self.events_container, &snapshot_id, &self.stream_id)
                        .await
                    {
                        Ok(doc) => {
                            version = doc.body.get("aggVersion").and_then(Value::as_u64).unwrap_or(0);
                            etag = Some(doc.etag);
                        }
                        Err(StoreError::NotFound) => {
                            version = 0;
                            etag = None;
                        }
                        Err(e) => {
                            warn!(stream_id = %self.stream_id, error = %e, "failed to re-read snapshot during retry");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(stream_id = %self.stream_id, error = %e, "ingestion append failed");
                    return;
                }
            }
        }
    }
}
