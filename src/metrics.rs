// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the outbox.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `outbox_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `reason`: age, retries, malformed
//! - `source`: enqueue, connectivity, request, interval, startup
//! - `operation`: enqueue, get_all, update, delete, trim, count

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::coordinator::{CoordinatorState, FlushMetrics};
use crate::eviction::policy::DropReason;

/// Record one producer enqueue
pub fn record_enqueued() {
    counter!("outbox_engine_enqueued_total").increment(1);
}

/// Record the counters of a finished cycle and the resulting depth
pub fn record_flush(m: &FlushMetrics) {
    counter!("outbox_engine_cycles_total").increment(1);
    counter!("outbox_engine_processed_total").increment(m.processed as u64);
    counter!("outbox_engine_succeeded_total").increment(m.succeeded as u64);
    counter!("outbox_engine_failed_total").increment(m.failed as u64);
    counter!("outbox_engine_dropped_total").increment(m.dropped as u64);
    set_queue_depth(m.queued_after);
}

/// Record a record dropped without delivery
pub fn record_drop(reason: DropReason) {
    counter!(
        "outbox_engine_drops_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record records discarded by the size cap
pub fn record_trimmed(count: usize) {
    counter!("outbox_engine_trimmed_total").increment(count as u64);
}

/// Set current number of queued records
pub fn set_queue_depth(count: usize) {
    gauge!("outbox_engine_queue_depth").set(count as f64);
}

/// Record a sync trigger
pub fn record_trigger(source: &'static str) {
    counter!(
        "outbox_engine_triggers_total",
        "source" => source
    )
    .increment(1);
}

/// Record a trigger absorbed because a cycle was already running
pub fn record_trigger_coalesced() {
    counter!("outbox_engine_triggers_coalesced_total").increment(1);
}

/// Record a failed credential fetch (`auth_denied` or `transient`)
pub fn record_credential_failure(kind: &'static str) {
    counter!(
        "outbox_engine_credential_failures_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a cycle aborted by a storage error
pub fn record_cycle_aborted() {
    counter!("outbox_engine_cycles_aborted_total").increment(1);
}

/// Record a storage error surfaced to a caller
pub fn record_storage_error(operation: &'static str) {
    counter!(
        "outbox_engine_storage_errors_total",
        "operation" => operation
    )
    .increment(1);
}

/// Record how long one flush cycle took
pub fn record_cycle_duration(duration: Duration) {
    histogram!("outbox_engine_cycle_seconds").record(duration.as_secs_f64());
}

/// Record send latency labelled by outcome
pub fn record_send_latency(ok: bool, duration: Duration) {
    histogram!(
        "outbox_engine_send_seconds",
        "outcome" => if ok { "ok" } else { "failed" }
    )
    .record(duration.as_secs_f64());
}

/// Set coordinator state (0 = Idle, 1 = Flushing)
pub fn set_coordinator_state(state: CoordinatorState) {
    let value = match state {
        CoordinatorState::Idle => 0.0,
        CoordinatorState::Flushing => 1.0,
    };
    gauge!("outbox_engine_coordinator_state").set(value);
}

/// Times an operation and records the elapsed time on drop.
pub struct CycleTimer {
    start: Instant,
}

impl CycleTimer {
    #[must_use]
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for CycleTimer {
    fn drop(&mut self) {
        record_cycle_duration(self.start.elapsed());
    }
}
