// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed persistence over a [`DurableStore`].
//!
//! Every reader returns a safe default (`None`, empty queue, empty object)
//! when the key is missing, the store fails, or the stored JSON is
//! malformed. Writers are best-effort: storage errors are logged and
//! swallowed, and the coordinator's in-memory state is the fallback of
//! record for the current process.
//!
//! The conversion queue is the exception. Its read-modify-write paths tell a
//! failed read apart from a missing key and never overwrite a queue they
//! could not read; events the store cannot take are held in memory.
//!
//! # Keys
//!
//! | Key | Value |
//! |---|---|
//! | `@mobana:install_id` | install identifier (plain string) |
//! | `@mobana:attribution` | [`AttributionRecord`] |
//! | `@mobana:conversion_queue` | JSON array of [`ConversionEvent`] |
//! | `@mobana:flow_cache:{slug}` | [`CachedFlow`] |
//! | `@mobana:local_data` | JSON object |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::attribution::AttributionRecord;
use crate::conversion::ConversionEvent;
use crate::metrics;
use crate::storage::{DurableStore, StorageError};

pub const INSTALL_ID_KEY: &str = "@mobana:install_id";
pub const ATTRIBUTION_KEY: &str = "@mobana:attribution";
pub const CONVERSION_QUEUE_KEY: &str = "@mobana:conversion_queue";
pub const FLOW_CACHE_PREFIX: &str = "@mobana:flow_cache:";
pub const LOCAL_DATA_KEY: &str = "@mobana:local_data";

/// Flow content cached for one slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFlow {
    pub version_id: String,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js: Option<String>,
    pub cached_at: DateTime<Utc>,
}

/// Typed accessors over the durable store.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn DurableStore>,
    /// Conversions the store could not take, oldest first
    held: Arc<Mutex<Vec<ConversionEvent>>>,
}

impl Persistence {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            held: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Raw helpers
    // ═══════════════════════════════════════════════════════════════════════

    async fn read_raw(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Durable read failed, using default");
                metrics::record_storage_error("get");
                None
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Malformed JSON in durable store, ignoring");
                None
            }
        }
    }

    async fn write_raw(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value).await {
            warn!(key, error = %e, "Durable write failed");
            metrics::record_storage_error("set");
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.write_raw(key, &raw).await,
            Err(e) => warn!(key, error = %e, "Failed to encode value for durable store"),
        }
    }

    async fn remove(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "Durable delete failed");
            metrics::record_storage_error("delete");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Install identity
    // ═══════════════════════════════════════════════════════════════════════

    /// Stored install id, if any.
    pub async fn install_id(&self) -> Option<String> {
        self.read_raw(INSTALL_ID_KEY)
            .await
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    /// Stored install id, or a fresh UUID v4 persisted on first access.
    ///
    /// If the write fails the generated id is still returned; callers cache
    /// it in memory for the rest of the session.
    pub async fn get_or_create_install_id(&self) -> String {
        if let Some(id) = self.install_id().await {
            return id;
        }
        let id = uuid::Uuid::new_v4().to_string();
        debug!(install_id = %id, "Generated new install id");
        self.write_raw(INSTALL_ID_KEY, &id).await;
        id
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Attribution record
    // ═══════════════════════════════════════════════════════════════════════

    /// Cached definitive attribution answer. Inconsistent records are ignored.
    pub async fn attribution(&self) -> Option<AttributionRecord> {
        let record: AttributionRecord = self.read_json(ATTRIBUTION_KEY).await?;
        if record.is_consistent() {
            Some(record)
        } else {
            warn!("Ignoring inconsistent attribution record");
            None
        }
    }

    pub async fn set_attribution(&self, record: &AttributionRecord) {
        self.write_json(ATTRIBUTION_KEY, record).await;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Conversion queue
    // ═══════════════════════════════════════════════════════════════════════

    /// Queued conversions, oldest first, including any held in memory.
    pub async fn conversion_queue(&self) -> Vec<ConversionEvent> {
        let mut queue = self.read_queue().await.unwrap_or_default();
        queue.extend(self.held.lock().iter().cloned());
        queue
    }

    /// Stored queue. Missing and malformed values read as empty; only a
    /// store failure is an error, so callers never overwrite a queue they
    /// could not read.
    async fn read_queue(&self) -> Result<Vec<ConversionEvent>, StorageError> {
        let raw = self.store.get(CONVERSION_QUEUE_KEY).await.map_err(|e| {
            warn!(error = %e, "Conversion queue read failed");
            metrics::record_storage_error("get");
            e
        })?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(queue) => Ok(queue),
            Err(e) => {
                warn!(error = %e, "Malformed conversion queue, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Returns `false` if the store rejected the write.
    async fn write_queue(&self, queue: &[ConversionEvent]) -> bool {
        let result = if queue.is_empty() {
            self.store.delete(CONVERSION_QUEUE_KEY).await
        } else {
            match serde_json::to_string(queue) {
                Ok(raw) => self.store.set(CONVERSION_QUEUE_KEY, &raw).await,
                Err(e) => {
                    warn!(error = %e, "Failed to encode conversion queue");
                    return false;
                }
            }
        };
        match result {
            Ok(()) => {
                metrics::set_conversion_queue_depth(queue.len() + self.held.lock().len());
                true
            }
            Err(e) => {
                warn!(error = %e, depth = queue.len(), "Conversion queue write failed");
                metrics::record_storage_error(if queue.is_empty() { "delete" } else { "set" });
                false
            }
        }
    }

    /// Keep events in memory until the store accepts them again.
    fn hold(&self, events: Vec<ConversionEvent>) {
        debug!(count = events.len(), "Holding conversions in memory");
        self.held.lock().extend(events);
    }

    fn take_held(&self) -> Vec<ConversionEvent> {
        std::mem::take(&mut *self.held.lock())
    }

    /// Append one event to the tail of the queue.
    ///
    /// If the stored queue cannot be read or written, the event (and any
    /// already held) stays in memory and joins the queue on the next
    /// successful write or take.
    pub async fn enqueue_conversion(&self, event: ConversionEvent) {
        let Ok(mut queue) = self.read_queue().await else {
            self.hold(vec![event]);
            return;
        };
        let stored = queue.len();
        queue.extend(self.take_held());
        queue.push(event);
        if !self.write_queue(&queue).await {
            self.hold(queue.split_off(stored));
        }
    }

    /// Read the whole queue and clear it.
    ///
    /// `None` when the stored queue could not be read or cleared; the caller
    /// must not send anything, since the entries are still stored.
    pub async fn take_conversion_queue(&self) -> Option<Vec<ConversionEvent>> {
        let mut queue = self.read_queue().await.ok()?;
        if !queue.is_empty() && !self.write_queue(&[]).await {
            return None;
        }
        queue.extend(self.take_held());
        Some(queue)
    }

    /// Put events whose send failed back at the head of the queue, ahead of
    /// anything enqueued since the queue was taken. Held in memory if the
    /// stored queue cannot be read or written.
    pub async fn requeue_conversions(&self, failed: Vec<ConversionEvent>) {
        if failed.is_empty() {
            return;
        }
        let Ok(newer) = self.read_queue().await else {
            self.hold(failed);
            return;
        };
        let count = failed.len();
        let mut queue = failed;
        queue.extend(newer);
        if !self.write_queue(&queue).await {
            queue.truncate(count);
            self.hold(queue);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Flow cache
    // ═══════════════════════════════════════════════════════════════════════

    fn flow_key(slug: &str) -> String {
        format!("{}{}", FLOW_CACHE_PREFIX, slug)
    }

    pub async fn flow_cache(&self, slug: &str) -> Option<CachedFlow> {
        self.read_json(&Self::flow_key(slug)).await
    }

    /// Overwrite the cached content for `slug`.
    pub async fn set_flow_cache(&self, slug: &str, flow: &CachedFlow) {
        self.write_json(&Self::flow_key(slug), flow).await;
    }

    pub async fn clear_flow_cache(&self, slug: &str) {
        self.remove(&Self::flow_key(slug)).await;
    }

    /// Remove every cached flow, leaving keys outside the namespace untouched.
    pub async fn clear_flow_caches(&self) {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate flow cache keys");
                metrics::record_storage_error("keys");
                return;
            }
        };
        let flow_keys: Vec<String> = keys
            .into_iter()
            .filter(|k| k.starts_with(FLOW_CACHE_PREFIX))
            .collect();
        if flow_keys.is_empty() {
            return;
        }
        if let Err(e) = self.store.delete_many(&flow_keys).await {
            warn!(error = %e, count = flow_keys.len(), "Failed to clear flow caches");
            metrics::record_storage_error("delete");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Local data
    // ═══════════════════════════════════════════════════════════════════════

    /// The local data object; empty when missing or not an object.
    pub async fn local_data(&self) -> Map<String, Value> {
        match self.read_json::<Value>(LOCAL_DATA_KEY).await {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Replace the whole object.
    pub async fn set_local_data(&self, data: &Map<String, Value>) {
        self.write_json(LOCAL_DATA_KEY, data).await;
    }

    /// Shallow-merge `patch` into the stored object and return the result.
    pub async fn merge_local_data(&self, patch: Map<String, Value>) -> Map<String, Value> {
        let mut data = self.local_data().await;
        data.extend(patch);
        self.set_local_data(&data).await;
        data
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reset
    // ═══════════════════════════════════════════════════════════════════════

    /// Remove every SDK key.
    pub async fn clear_all(&self) {
        for key in [INSTALL_ID_KEY, ATTRIBUTION_KEY, CONVERSION_QUEUE_KEY, LOCAL_DATA_KEY] {
            self.remove(key).await;
        }
        self.held.lock().clear();
        self.clear_flow_caches().await;
        metrics::set_conversion_queue_depth(0);
    }
}
