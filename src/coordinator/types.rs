//! Public types for the sync coordinator.

use serde::{Deserialize, Serialize};

use crate::storage::traits::StorageError;

/// Single-flight state of the coordinator.
///
/// Watch it through [`super::SyncCoordinator::state_receiver()`]; only the
/// coordinator itself moves between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No cycle running; the next trigger starts one
    Idle,
    /// A cycle is in progress; triggers are coalesced
    Flushing,
}

impl CoordinatorState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Flushing => "Flushing",
        }
    }
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one flush cycle.
///
/// Serializes to the shape the backend sync-log endpoint accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushMetrics {
    pub queued_before: usize,
    pub queued_after: usize,
    /// Records selected for delivery this cycle (malformed ones included)
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Evicted for age/retries plus malformed records
    pub dropped: usize,
    /// Cycle time, epoch millis
    pub timestamp: i64,
}

impl FlushMetrics {
    /// All-zero report for a cycle that found nothing queued.
    #[must_use]
    pub fn empty(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// The cycle left nothing behind.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.queued_after == 0
    }
}

/// What a call to [`super::SyncCoordinator::sync_now()`] ended up doing.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The flusher ran to the end of its batch
    Completed(FlushMetrics),
    /// Another cycle was already running; this trigger was absorbed
    Coalesced,
    /// Credential provider rejected the session; queue untouched
    SessionExpired,
    /// Credential could not be fetched right now; queue untouched
    CredentialUnavailable,
    /// Storage failed mid-cycle; records are either fully written or untouched
    Aborted(StorageError),
}

impl CycleOutcome {
    /// Metrics of a completed cycle.
    #[must_use]
    pub fn metrics(&self) -> Option<&FlushMetrics> {
        match self {
            Self::Completed(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed(m) => write!(
                f,
                "Completed(processed={}, succeeded={}, failed={}, dropped={}, remaining={})",
                m.processed, m.succeeded, m.failed, m.dropped, m.queued_after
            ),
            Self::Coalesced => write!(f, "Coalesced"),
            Self::SessionExpired => write!(f, "SessionExpired"),
            Self::CredentialUnavailable => write!(f, "CredentialUnavailable"),
            Self::Aborted(e) => write!(f, "Aborted({})", e),
        }
    }
}
