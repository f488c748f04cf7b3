// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Producer-facing facade.
//!
//! [`Outbox`] is what the form layer talks to: it persists submissions,
//! pokes the coordinator and, for the online-first path, tries a direct send
//! before falling back to the queue.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OutboxConfig;
use crate::coordinator::SyncCoordinator;
use crate::notify::{
    ChannelObserver, FanoutReportSink, HttpReportSink, MetricsReportSink, OutboxEvent, ReportSink, TracingReportSink,
};
use crate::queued_record::QueuedRecord;
use crate::storage::memory::InMemoryQueueStore;
use crate::storage::sql::SqlQueueStore;
use crate::storage::traits::{QueueStore, StorageError};
use crate::transport::{CredentialProvider, HttpCredentialProvider, HttpTransport, StaticCredentials, TransportError};

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Payload is not serializable: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result of [`Outbox::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    /// Delivered straight away
    Sent { status: u16 },
    /// Persisted for a later cycle; carries the record id
    Queued(String),
}

pub struct Outbox {
    store: Arc<dyn QueueStore>,
    coordinator: Arc<SyncCoordinator>,
    connectivity: watch::Receiver<bool>,
    events: Option<ChannelObserver>,
}

impl Outbox {
    /// Wrap an already assembled coordinator. `connectivity` reports whether
    /// the device is online.
    pub fn new(coordinator: Arc<SyncCoordinator>, connectivity: watch::Receiver<bool>) -> Self {
        Self {
            store: Arc::clone(coordinator.store()),
            coordinator,
            connectivity,
            events: None,
        }
    }

    /// Assemble everything from configuration.
    ///
    /// - `db_path` set: SQLite store, otherwise in memory
    /// - `submit_url` is required
    /// - `credential_url` set: CSRF token fetched before each cycle
    /// - `sync_log_url` set: cycle metrics POSTed there as well
    ///
    /// # Errors
    /// Fails if `submit_url` is missing, the store cannot be opened, or an
    /// HTTP client cannot be built.
    pub async fn from_config(
        config: OutboxConfig,
        config_rx: watch::Receiver<OutboxConfig>,
        connectivity: watch::Receiver<bool>,
    ) -> Result<Self, OutboxError> {
        let submit_url = config
            .submit_url
            .clone()
            .ok_or_else(|| OutboxError::Config("submit_url is required".to_string()))?;
        let timeout = config.send_timeout();

        let store: Arc<dyn QueueStore> = match &config.db_path {
            Some(path) => Arc::new(SqlQueueStore::open(path).await?),
            None => {
                warn!("No db_path configured, queued records will not survive a restart");
                Arc::new(InMemoryQueueStore::new())
            }
        };

        let transport = HttpTransport::new(submit_url, timeout)?;

        let credentials: Arc<dyn CredentialProvider> = match &config.credential_url {
            Some(url) => Arc::new(HttpCredentialProvider::new(url.clone(), timeout)?),
            None => Arc::new(StaticCredentials::anonymous()),
        };

        let mut sink = FanoutReportSink::new()
            .with(Arc::new(TracingReportSink))
            .with(Arc::new(MetricsReportSink));
        if let Some(url) = &config.sync_log_url {
            sink = sink.with(Arc::new(HttpReportSink::new(url.clone(), timeout)?) as Arc<dyn ReportSink>);
        }

        let events = ChannelObserver::default();
        let coordinator = SyncCoordinator::new(config, config_rx, store, Arc::new(transport))
            .with_credentials(credentials)
            .with_report_sink(Arc::new(sink))
            .with_observer(Arc::new(events.clone()));

        let mut outbox = Self::new(Arc::new(coordinator), connectivity);
        outbox.events = Some(events);
        Ok(outbox)
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Observer events, when the outbox was built by [`from_config`](Self::from_config).
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<OutboxEvent>> {
        self.events.as_ref().map(ChannelObserver::subscribe)
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Serialize and queue a payload. Returns the record id once persisted.
    pub async fn enqueue(&self, payload: &Value) -> Result<String, OutboxError> {
        let body = serde_json::to_string(payload)?;
        self.enqueue_raw(body).await
    }

    /// Queue an already serialized body.
    pub async fn enqueue_raw(&self, body: String) -> Result<String, OutboxError> {
        let record = QueuedRecord::new(body);
        self.persist(&record).await?;
        Ok(record.id)
    }

    /// Online-first submission.
    ///
    /// While online, send directly; on success also request a sync so older
    /// queued records follow. Any failure (offline, no credential, non-ok
    /// send) queues the record under the id the direct attempt used, so the
    /// server can dedupe a send whose response was lost.
    pub async fn submit(&self, payload: &Value) -> Result<Submitted, OutboxError> {
        let record = QueuedRecord::new(serde_json::to_string(payload)?);

        if self.is_online() {
            match self.coordinator.send_direct(payload, &record).await {
                Ok(outcome) if outcome.ok => {
                    debug!(id = %record.id, status = outcome.status, "Submitted directly");
                    self.coordinator.request_sync();
                    return Ok(Submitted::Sent { status: outcome.status });
                }
                Ok(outcome) => {
                    debug!(id = %record.id, status = outcome.status, "Direct send failed, queueing");
                }
                Err(e) => {
                    debug!(id = %record.id, error = %e, "No credential for direct send, queueing");
                }
            }
        }

        self.persist(&record).await?;
        Ok(Submitted::Queued(record.id))
    }

    /// Number of records waiting.
    pub async fn pending(&self) -> Result<usize, OutboxError> {
        Ok(self.store.count().await?)
    }

    /// Spawn the coordinator's trigger loop on the current runtime.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let coordinator = Arc::clone(&self.coordinator);
        let connectivity = self.connectivity.clone();
        tokio::spawn(async move { coordinator.run(connectivity, shutdown).await })
    }

    async fn persist(&self, record: &QueuedRecord) -> Result<(), OutboxError> {
        if let Err(e) = self.store.enqueue(record).await {
            warn!(id = %record.id, error = %e, "Failed to queue record");
            crate::metrics::record_storage_error("enqueue");
            return Err(e.into());
        }
        crate::metrics::record_enqueued();
        info!(id = %record.id, bytes = record.size_bytes(), "Record queued");

        if self.coordinator.config().sync_on_enqueue {
            self.coordinator.trigger("enqueue");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Credential, SendOutcome, Transport};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedTransport(SendOutcome);

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(&self, _payload: &Value, _record: &QueuedRecord, _credential: &Credential) -> SendOutcome {
            self.0
        }
    }

    fn outbox(outcome: SendOutcome, online: bool) -> (Outbox, watch::Sender<bool>) {
        let config = OutboxConfig::default();
        let (_cfg_tx, cfg_rx) = watch::channel(config.clone());
        let coordinator = SyncCoordinator::new(
            config,
            cfg_rx,
            Arc::new(InMemoryQueueStore::new()),
            Arc::new(FixedTransport(outcome)),
        );
        let (online_tx, online_rx) = watch::channel(online);
        (Outbox::new(Arc::new(coordinator), online_rx), online_tx)
    }

    #[tokio::test]
    async fn test_enqueue_persists() {
        let (outbox, _online) = outbox(SendOutcome::delivered(200), false);

        let id = outbox.enqueue(&json!({"customer": "C-1", "qty": 2})).await.unwrap();

        assert_eq!(outbox.pending().await.unwrap(), 1);
        let stored = outbox.store.get_all().await.unwrap();
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].retry_count, 0);
        assert_eq!(stored[0].decode_body().unwrap(), json!({"customer": "C-1", "qty": 2}));
    }

    #[tokio::test]
    async fn test_submit_online_sends_directly() {
        let (outbox, _online) = outbox(SendOutcome::delivered(201), true);

        let result = outbox.submit(&json!({"a": 1})).await.unwrap();

        assert_eq!(result, Submitted::Sent { status: 201 });
        assert_eq!(outbox.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_submit_failure_falls_back_to_queue() {
        let (outbox, _online) = outbox(SendOutcome::rejected(502), true);

        let result = outbox.submit(&json!({"a": 1})).await.unwrap();

        let Submitted::Queued(id) = result else {
            panic!("expected queued, got {:?}", result);
        };
        let stored = outbox.store.get_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        // The direct attempt is not counted as a retry
        assert_eq!(stored[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_submit_offline_queues_without_sending() {
        let (outbox, _online) = outbox(SendOutcome::delivered(200), false);

        let result = outbox.submit(&json!({})).await.unwrap();

        assert!(matches!(result, Submitted::Queued(_)));
        assert_eq!(outbox.pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_from_config_requires_submit_url() {
        let config = OutboxConfig::default();
        let (_cfg_tx, cfg_rx) = watch::channel(config.clone());
        let (_online_tx, online_rx) = watch::channel(true);

        let err = Outbox::from_config(config, cfg_rx, online_rx).await.err().unwrap();

        assert!(matches!(err, OutboxError::Config(_)));
    }

    #[tokio::test]
    async fn test_from_config_wires_event_channel() {
        let config = OutboxConfig {
            submit_url: Some("http://127.0.0.1:9/submit".into()),
            ..OutboxConfig::default()
        };
        let (_cfg_tx, cfg_rx) = watch::channel(config.clone());
        let (_online_tx, online_rx) = watch::channel(false);

        let outbox = Outbox::from_config(config, cfg_rx, online_rx).await.unwrap();

        assert!(outbox.subscribe().is_some());
        assert!(!outbox.is_online());
    }
}
