// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-cycle reporting and observer notifications.
//!
//! Two seams leave the queue after every cycle:
//! - a [`ReportSink`] receives the [`FlushMetrics`] (log, metrics facade,
//!   backend sync-log endpoint)
//! - an [`OutboxObserver`] hears about individual drops, a drained queue and
//!   an expired session, so a UI can tell the agent what happened
//!
//! Neither may fail a cycle: sinks swallow and log their own errors.

pub mod sinks;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::coordinator::FlushMetrics;
use crate::eviction::policy::DropReason;
use crate::queued_record::QueuedRecord;

pub use sinks::{FanoutReportSink, HttpReportSink, MetricsReportSink, TracingReportSink};

/// Destination for per-cycle metrics.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, metrics: &FlushMetrics);
}

/// Interested parties outside the queue. All hooks default to no-ops.
pub trait OutboxObserver: Send + Sync {
    /// A record was removed without delivery.
    fn on_drop(&self, _record: &QueuedRecord, _reason: DropReason) {}
    /// A cycle finished with an empty store.
    fn on_drained(&self) {}
    /// A cycle finished; fired even when the queue was empty.
    fn on_metrics(&self, _metrics: &FlushMetrics) {}
    /// The credential provider rejected the session; the user must log in.
    fn on_session_expired(&self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl OutboxObserver for NoopObserver {}

/// Events published by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxEvent {
    Dropped { id: String, reason: DropReason },
    Flushed(FlushMetrics),
    Drained,
    SessionExpired,
}

/// Broadcasts observer hooks as [`OutboxEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: broadcast::Sender<OutboxEvent>,
}

impl ChannelObserver {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutboxEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: OutboxEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for ChannelObserver {
    fn default() -> Self {
        Self::new(64)
    }
}

impl OutboxObserver for ChannelObserver {
    fn on_drop(&self, record: &QueuedRecord, reason: DropReason) {
        self.publish(OutboxEvent::Dropped {
            id: record.id.clone(),
            reason,
        });
    }

    fn on_drained(&self) {
        self.publish(OutboxEvent::Drained);
    }

    fn on_metrics(&self, metrics: &FlushMetrics) {
        self.publish(OutboxEvent::Flushed(*metrics));
    }

    fn on_session_expired(&self) {
        self.publish(OutboxEvent::SessionExpired);
    }
}
