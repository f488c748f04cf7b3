// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator.
//!
//! The [`SyncCoordinator`] owns the single-flight guard in front of the
//! flusher. Whatever fires a trigger (an enqueue, connectivity coming back,
//! an explicit request, the periodic wake) at most one cycle runs at a time;
//! triggers that land while a cycle is running are absorbed.
//!
//! # States
//!
//! ```text
//!            trigger                        flush done / aborted
//!   Idle ─────────────► Flushing ──────────────────────────────► Idle
//!                          │ ▲
//!                          └─┘ trigger (coalesced)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use outbox_engine::{OutboxConfig, SyncCoordinator, CoordinatorState, HttpTransport};
//! use outbox_engine::storage::memory::InMemoryQueueStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::watch;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = OutboxConfig::default();
//! let (_tx, rx) = watch::channel(config.clone());
//! let transport = HttpTransport::new("http://localhost:8000/submit", Duration::from_secs(30)).unwrap();
//! let coordinator = SyncCoordinator::new(
//!     config,
//!     rx,
//!     Arc::new(InMemoryQueueStore::new()),
//!     Arc::new(transport),
//! );
//!
//! assert_eq!(coordinator.state(), CoordinatorState::Idle);
//! let outcome = coordinator.sync_now().await;
//! println!("{}", outcome);
//! # }
//! ```

mod types;
mod flush;
mod lifecycle;

pub use types::{CoordinatorState, CycleOutcome, FlushMetrics};
pub use flush::{FlushSettings, Flusher};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::config::OutboxConfig;
use crate::notify::{NoopObserver, OutboxObserver, ReportSink, TracingReportSink};
use crate::queued_record::{now_ms, QueuedRecord};
use crate::storage::traits::QueueStore;
use crate::transport::{CredentialError, CredentialProvider, SendOutcome, StaticCredentials, Transport};

/// Single-flight flush coordinator.
///
/// Share it behind an `Arc`: [`run()`](Self::run) and the trigger methods
/// all take `&self`.
pub struct SyncCoordinator {
    /// Current limits; replaced by the run loop on config updates
    pub(super) config: RwLock<OutboxConfig>,

    /// Runtime config updates (Mutex for interior mutability in run loop)
    pub(super) config_rx: Mutex<watch::Receiver<OutboxConfig>>,

    pub(super) state: watch::Sender<CoordinatorState>,
    pub(super) state_rx: watch::Receiver<CoordinatorState>,

    /// The guard itself; `state` only mirrors it for watchers
    pub(super) flushing: AtomicBool,

    /// Wakes the run loop for a requested sync
    pub(super) sync_requested: Notify,

    pub(super) store: Arc<dyn QueueStore>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) credentials: Arc<dyn CredentialProvider>,
    pub(super) sink: Arc<dyn ReportSink>,
    pub(super) observer: Arc<dyn OutboxObserver>,
}

impl SyncCoordinator {
    /// Create an idle coordinator with anonymous credentials, a logging
    /// report sink and no observer.
    pub fn new(
        config: OutboxConfig,
        config_rx: watch::Receiver<OutboxConfig>,
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(CoordinatorState::Idle);

        Self {
            config: RwLock::new(config),
            config_rx: Mutex::new(config_rx),
            state: state_tx,
            state_rx,
            flushing: AtomicBool::new(false),
            sync_requested: Notify::new(),
            store,
            transport,
            credentials: Arc::new(StaticCredentials::anonymous()),
            sink: Arc::new(TracingReportSink),
            observer: Arc::new(NoopObserver),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn OutboxObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CoordinatorState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Snapshot of the configuration the next cycle will use.
    #[must_use]
    pub fn config(&self) -> OutboxConfig {
        self.config.read().clone()
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Ask the run loop for a cycle. Ignored while a cycle is running.
    ///
    /// Requests made before [`run()`](Self::run) starts collapse into one
    /// cycle once it does.
    pub fn request_sync(&self) {
        self.trigger("request");
    }

    pub(crate) fn trigger(&self, source: &'static str) {
        if self.is_flushing() {
            debug!(source, "Sync already in progress, trigger coalesced");
            crate::metrics::record_trigger_coalesced();
            return;
        }
        crate::metrics::record_trigger(source);
        self.sync_requested.notify_one();
    }

    /// Run one cycle right now, unless one is already running.
    ///
    /// Never fails: every way a cycle can end is a [`CycleOutcome`].
    #[tracing::instrument(skip(self))]
    pub async fn sync_now(&self) -> CycleOutcome {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress, trigger coalesced");
            crate::metrics::record_trigger_coalesced();
            return CycleOutcome::Coalesced;
        }
        let _guard = FlushGuard::enter(&self.flushing, &self.state);
        let _timer = crate::metrics::CycleTimer::start();

        let credential = match self.credentials.fetch_credential().await {
            Ok(credential) => credential,
            Err(CredentialError::AuthDenied(reason)) => {
                warn!(reason = %reason, "Session expired, sync postponed until re-login");
                crate::metrics::record_credential_failure("auth_denied");
                self.observer.on_session_expired();
                return CycleOutcome::SessionExpired;
            }
            Err(CredentialError::Transient(reason)) => {
                debug!(reason = %reason, "Credential unavailable, sync postponed");
                crate::metrics::record_credential_failure("transient");
                return CycleOutcome::CredentialUnavailable;
            }
        };

        let settings = FlushSettings::from(&*self.config.read());
        let flusher = Flusher {
            store: self.store.as_ref(),
            transport: self.transport.as_ref(),
            credential: &credential,
            sink: self.sink.as_ref(),
            observer: self.observer.as_ref(),
            settings,
        };

        match flusher.flush(now_ms()).await {
            Ok(metrics) => {
                if metrics.is_drained() {
                    if metrics.queued_before > 0 {
                        info!(succeeded = metrics.succeeded, dropped = metrics.dropped, "Outbox drained");
                    }
                    self.observer.on_drained();
                }
                CycleOutcome::Completed(metrics)
            }
            Err(e) => {
                error!(error = %e, "Flush cycle aborted by storage failure");
                crate::metrics::record_cycle_aborted();
                CycleOutcome::Aborted(e)
            }
        }
    }

    /// Send one payload immediately, bypassing the queue.
    ///
    /// Used by the online-first submit path. A rejected session is reported
    /// to the observer like it is for a cycle.
    pub async fn send_direct(&self, payload: &Value, record: &QueuedRecord) -> Result<SendOutcome, CredentialError> {
        let credential = match self.credentials.fetch_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                if matches!(e, CredentialError::AuthDenied(_)) {
                    crate::metrics::record_credential_failure("auth_denied");
                    self.observer.on_session_expired();
                } else {
                    crate::metrics::record_credential_failure("transient");
                }
                return Err(e);
            }
        };
        Ok(self.transport.send(payload, record, &credential).await)
    }
}

/// Holds the single-flight flag for the length of a cycle.
struct FlushGuard<'a> {
    flushing: &'a AtomicBool,
    state: &'a watch::Sender<CoordinatorState>,
}

impl<'a> FlushGuard<'a> {
    fn enter(flushing: &'a AtomicBool, state: &'a watch::Sender<CoordinatorState>) -> Self {
        state.send_replace(CoordinatorState::Flushing);
        crate::metrics::set_coordinator_state(CoordinatorState::Flushing);
        Self { flushing, state }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        // Publish Idle before releasing the flag so a new cycle's Flushing wins
        self.state.send_replace(CoordinatorState::Idle);
        crate::metrics::set_coordinator_state(CoordinatorState::Idle);
        self.flushing.store(false, Ordering::Release);
    }
}
