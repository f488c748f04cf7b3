// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::{Deserialize, Serialize};

use crate::queued_record::QueuedRecord;

/// Why a record left the queue without being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Older than the configured time-to-live
    Age,
    /// Hit the retry ceiling
    Retries,
    /// Body cannot be decoded; will never succeed
    Malformed,
}

impl DropReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Retries => "retries",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`EvictionPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropDecision {
    pub drop: bool,
    pub reason: Option<DropReason>,
    /// Age the decision was based on (0 when `created_at` is unparsable)
    pub age_ms: i64,
    pub retry_count: u32,
}

/// Age and retry limits. `None` disables the corresponding check, which is
/// distinct from a limit of zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_age_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

impl EvictionPolicy {
    #[must_use]
    pub fn new(max_age_ms: Option<u64>, max_retries: Option<u32>) -> Self {
        Self { max_age_ms, max_retries }
    }

    /// A policy that never drops anything.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Decide whether `record` should be evicted at `now_ms`.
    ///
    /// Age is checked before retries, so a record over both limits is
    /// reported as [`DropReason::Age`]. A malformed or missing `created_at`
    /// counts as age 0: it can still be evicted for retries, never for age.
    #[must_use]
    pub fn decide(&self, record: &QueuedRecord, now_ms: i64) -> DropDecision {
        let retry_count = record.retry_count;
        let age_ms = record
            .created_at_ms()
            .map_or(0, |created| now_ms.saturating_sub(created));

        let reason = if self.max_age_ms.is_some_and(|max| age_ms > 0 && age_ms as u64 > max) {
            Some(DropReason::Age)
        } else if self.max_retries.is_some_and(|max| retry_count >= max) {
            Some(DropReason::Retries)
        } else {
            None
        };

        DropDecision {
            drop: reason.is_some(),
            reason,
            age_ms,
            retry_count,
        }
    }
}
