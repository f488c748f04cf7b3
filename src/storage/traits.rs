// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use crate::queued_record::QueuedRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Record '{0}' is already queued")]
    Duplicate(String),
    #[error("Corrupt record '{id}': {reason}")]
    Corruption {
        id: String,
        reason: String,
    },
}

/// Durable keyed storage for pending outbox records.
///
/// Every operation is atomic for a single record. There is no cross-record
/// transaction: a flush cycle that fails half way leaves each record either
/// fully written or untouched.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new record. Fails with [`StorageError::Duplicate`] if the id is taken.
    async fn enqueue(&self, record: &QueuedRecord) -> Result<(), StorageError>;

    /// Every stored record, in no particular order.
    async fn get_all(&self) -> Result<Vec<QueuedRecord>, StorageError>;

    /// Replace the stored record with the same id. No-op if it is gone.
    async fn update(&self, record: &QueuedRecord) -> Result<(), StorageError>;

    /// Remove a record. No-op if absent.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Delete the oldest records (by `created_at`) until at most `max` remain.
    /// Returns the number removed.
    async fn trim_to_max(&self, max: usize) -> Result<usize, StorageError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.get_all().await?.len())
    }
}

/// Pick the ids to remove so that at most `max` records remain, oldest first.
/// Ties on `created_at` are broken by id so the choice is deterministic.
pub(crate) fn excess_oldest(records: &[QueuedRecord], max: usize) -> Vec<String> {
    if records.len() <= max {
        return Vec::new();
    }
    let mut keys: Vec<(i64, &str)> = records
        .iter()
        .map(|r| (r.sort_key(), r.id.as_str()))
        .collect();
    keys.sort_unstable();
    keys.into_iter()
        .take(records.len() - max)
        .map(|(_, id)| id.to_string())
        .collect()
}
