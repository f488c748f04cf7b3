//! # Outbox Engine
//!
//! A durable offline outbox for clients that are only sometimes connected.
//!
//! ## Architecture
//!
//! Submissions that cannot go out right away are persisted locally and
//! delivered later, oldest first, by bounded flush cycles:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Producer                             │
//! │  • Outbox::enqueue() / submit()                            │
//! │  • Online-first submit falls back to the queue             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       QueueStore                            │
//! │  • SQLite (WAL mode) or in-memory DashMap                  │
//! │  • One row per record, indexed by created_at               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          (trigger: enqueue, reconnect, request, periodic)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SyncCoordinator                          │
//! │  • Single-flight guard: Idle ↔ Flushing                    │
//! │  • Fetches the session credential                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Flusher                              │
//! │  • Evict by age / retries, then oldest-first batch         │
//! │  • Send via Transport, delete or bump retry_count          │
//! │  • Trim to max size, report FlushMetrics                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once: the record id travels as an idempotency key
//! and the backend is expected to upsert.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outbox_engine::{Outbox, OutboxConfig, Submitted};
//! use serde_json::json;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OutboxConfig {
//!         db_path: Some("outbox.db".into()),
//!         submit_url: Some("https://erp.example.com/api/method/upsert_draft".into()),
//!         credential_url: Some("https://erp.example.com/api/method/csrf_token".into()),
//!         ..Default::default()
//!     };
//!
//!     let (_config_tx, config_rx) = watch::channel(config.clone());
//!     let (online_tx, online_rx) = watch::channel(false);
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     let outbox = Outbox::from_config(config, config_rx, online_rx)
//!         .await
//!         .expect("Failed to open outbox");
//!     outbox.spawn(shutdown_rx);
//!
//!     // Offline: the record is queued
//!     let result = outbox.submit(&json!({"customer": "C-001", "qty": 4})).await.unwrap();
//!     assert!(matches!(result, Submitted::Queued(_)));
//!
//!     // Back online: the coordinator flushes the queue
//!     online_tx.send(true).ok();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`outbox`]: Producer facade
//! - [`coordinator`]: Single-flight [`SyncCoordinator`] and the flush cycle
//! - [`storage`]: Queue stores (SQLite, memory)
//! - [`eviction`]: Age / retry eviction policy
//! - [`transport`]: Send and credential seams, HTTP implementations
//! - [`notify`]: Report sinks and observers
//! - [`resilience`]: Retry with backoff

pub mod config;
pub mod queued_record;
pub mod storage;
pub mod resilience;
pub mod eviction;
pub mod transport;
pub mod notify;
pub mod coordinator;
pub mod outbox;
pub mod metrics;

pub use config::OutboxConfig;
pub use queued_record::QueuedRecord;
pub use coordinator::{CoordinatorState, CycleOutcome, FlushMetrics, FlushSettings, Flusher, SyncCoordinator};
pub use outbox::{Outbox, OutboxError, Submitted};
pub use storage::traits::{QueueStore, StorageError};
pub use storage::memory::InMemoryQueueStore;
pub use storage::sql::SqlQueueStore;
pub use eviction::policy::{DropDecision, DropReason, EvictionPolicy};
pub use transport::{
    Credential, CredentialError, CredentialProvider, HttpCredentialProvider, HttpTransport, SendOutcome,
    StaticCredentials, Transport, TransportError,
};
pub use notify::{
    ChannelObserver, FanoutReportSink, HttpReportSink, MetricsReportSink, NoopObserver, OutboxEvent, OutboxObserver,
    ReportSink, TracingReportSink,
};
pub use resilience::retry::RetryConfig;
