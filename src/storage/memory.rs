// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use crate::queued_record::QueuedRecord;
use super::traits::{excess_oldest, QueueStore, StorageError};

/// Non-durable queue store. Useful for tests and sessions that never
/// outlive the process.
pub struct InMemoryQueueStore {
    data: DashMap<String, QueuedRecord>,
}

impl InMemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Look up a single record by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<QueuedRecord> {
        self.data.get(id).map(|r| r.value().clone())
    }

    /// Drop every record
    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, record: &QueuedRecord) -> Result<(), StorageError> {
        match self.data.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Duplicate(record.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<QueuedRecord>, StorageError> {
        Ok(self.data.iter().map(|r| r.value().clone()).collect())
    }

    async fn update(&self, record: &QueuedRecord) -> Result<(), StorageError> {
        if let Some(mut existing) = self.data.get_mut(&record.id) {
            *existing = record.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.data.remove(id);
        Ok(())
    }

    async fn trim_to_max(&self, max: usize) -> Result<usize, StorageError> {
        let snapshot: Vec<QueuedRecord> = self.data.iter().map(|r| r.value().clone()).collect();
        let victims = excess_oldest(&snapshot, max);
        for id in &victims {
            self.data.remove(id);
        }
        Ok(victims.len())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.data.len())
    }
}
