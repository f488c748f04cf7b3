// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One flush cycle.
//!
//! ```text
//! get_all ─► evict (age / retries) ─► sort oldest-first ─► take batch
//!                 │                                            │
//!              delete                            decode ─► send ─► delete | retry+1
//!                                                   │
//!                                              malformed: delete
//!
//! ─► trim_to_max ─► count ─► report
//! ```
//!
//! Records are handled strictly one at a time. Any [`StorageError`] aborts
//! the cycle where it happened; everything written up to that point stays
//! written.

use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::OutboxConfig;
use crate::eviction::policy::{DropReason, EvictionPolicy};
use crate::notify::{OutboxObserver, ReportSink};
use crate::queued_record::QueuedRecord;
use crate::storage::traits::{QueueStore, StorageError};
use crate::transport::{Credential, Transport};

use super::FlushMetrics;

/// Limits applied by one cycle, snapshotted from [`OutboxConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSettings {
    pub max_age_ms: Option<u64>,
    pub max_retries: Option<u32>,
    /// `None` or `Some(0)` processes every candidate
    pub max_batch_size: Option<usize>,
    /// `None` or `Some(0)` skips the trim
    pub max_queue_size: Option<usize>,
}

impl FlushSettings {
    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::new(self.max_age_ms, self.max_retries)
    }

    fn batch_limit(&self) -> Option<usize> {
        self.max_batch_size.filter(|n| *n > 0)
    }

    fn queue_cap(&self) -> Option<usize> {
        self.max_queue_size.filter(|n| *n > 0)
    }
}

impl From<&OutboxConfig> for FlushSettings {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            max_age_ms: config.max_age_ms,
            max_retries: config.max_retries,
            max_batch_size: config.max_batch_size,
            max_queue_size: config.max_queue_size,
        }
    }
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self::from(&OutboxConfig::default())
    }
}

/// Runs a single cycle against borrowed collaborators.
pub struct Flusher<'a> {
    pub store: &'a dyn QueueStore,
    pub transport: &'a dyn Transport,
    pub credential: &'a Credential,
    pub sink: &'a dyn ReportSink,
    pub observer: &'a dyn OutboxObserver,
    pub settings: FlushSettings,
}

impl Flusher<'_> {
    /// Run one cycle as of `now_ms`.
    ///
    /// Reports the resulting metrics to the sink and observer before
    /// returning them. Nothing is reported when storage fails.
    pub async fn flush(&self, now_ms: i64) -> Result<FlushMetrics, StorageError> {
        let all = self.store.get_all().await.map_err(failed("get_all"))?;
        let queued_before = all.len();

        if queued_before == 0 {
            let metrics = FlushMetrics::empty(now_ms);
            self.report(&metrics).await;
            return Ok(metrics);
        }

        let mut metrics = FlushMetrics {
            queued_before,
            timestamp: now_ms,
            ..FlushMetrics::default()
        };

        let policy = self.settings.policy();
        let mut candidates = Vec::with_capacity(all.len());
        for record in all {
            let decision = policy.decide(&record, now_ms);
            match decision.reason {
                Some(reason) if decision.drop => {
                    self.store.delete(&record.id).await.map_err(failed("delete"))?;
                    debug!(
                        id = %record.id,
                        reason = %reason,
                        age_ms = decision.age_ms,
                        retry_count = decision.retry_count,
                        "Evicted queued record"
                    );
                    self.dropped(&record, reason);
                    metrics.dropped += 1;
                }
                _ => candidates.push(record),
            }
        }

        candidates.sort_by(|a, b| (a.sort_key(), &a.id).cmp(&(b.sort_key(), &b.id)));
        if let Some(limit) = self.settings.batch_limit() {
            candidates.truncate(limit);
        }

        for mut record in candidates {
            metrics.processed += 1;

            let payload = match record.decode_body() {
                Ok(payload) => payload,
                Err(e) => {
                    self.store.delete(&record.id).await.map_err(failed("delete"))?;
                    warn!(id = %record.id, error = %e, "Dropping record with undecodable body");
                    self.dropped(&record, DropReason::Malformed);
                    metrics.dropped += 1;
                    continue;
                }
            };

            let started = Instant::now();
            let outcome = self.transport.send(&payload, &record, self.credential).await;
            crate::metrics::record_send_latency(outcome.ok, started.elapsed());

            if outcome.ok {
                self.store.delete(&record.id).await.map_err(failed("delete"))?;
                metrics.succeeded += 1;
            } else {
                record.retry_count = record.retry_count.saturating_add(1);
                self.store.update(&record).await.map_err(failed("update"))?;
                debug!(
                    id = %record.id,
                    status = outcome.status,
                    retry_count = record.retry_count,
                    "Send failed, record kept for next cycle"
                );
                metrics.failed += 1;
            }
        }

        if let Some(cap) = self.settings.queue_cap() {
            let trimmed = self.store.trim_to_max(cap).await.map_err(failed("trim"))?;
            if trimmed > 0 {
                info!(trimmed, cap, "Queue over capacity, discarded oldest records");
                crate::metrics::record_trimmed(trimmed);
            }
        }

        metrics.queued_after = self.store.count().await.map_err(failed("count"))?;
        self.report(&metrics).await;
        Ok(metrics)
    }

    fn dropped(&self, record: &QueuedRecord, reason: DropReason) {
        crate::metrics::record_drop(reason);
        self.observer.on_drop(record, reason);
    }

    async fn report(&self, metrics: &FlushMetrics) {
        self.sink.report(metrics).await;
        self.observer.on_metrics(metrics);
    }
}

/// Count a storage failure against the operation that raised it.
fn failed(operation: &'static str) -> impl FnOnce(StorageError) -> StorageError {
    move |e| {
        crate::metrics::record_storage_error(operation);
        e
    }
}
