// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage unavailable")]
    Unavailable,
}

/// Durable string key-value store.
///
/// Values are opaque strings; callers JSON-encode them. Implementations are
/// expected to survive process restarts and may fail transiently.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored (used for namespace-scoped clears).
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Delete several keys. Default implementation falls back to sequential deletes.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }
}
