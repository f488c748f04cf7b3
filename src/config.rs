//! Configuration for the outbox.
//!
//! # Example
//!
//! ```
//! use outbox_engine::OutboxConfig;
//!
//! // Minimal config (uses defaults)
//! let config = OutboxConfig::default();
//! assert_eq!(config.max_retries, Some(5));
//! assert_eq!(config.max_batch_size, Some(10));
//!
//! // Full config
//! let config = OutboxConfig {
//!     db_path: Some("outbox.db".into()),
//!     submit_url: Some("https://erp.example.com/api/method/upsert_draft".into()),
//!     max_age_ms: None, // never age out
//!     sync_interval_secs: 0, // no periodic wake
//!     ..Default::default()
//! };
//! assert!(config.sync_interval().is_none());
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::eviction::policy::EvictionPolicy;

/// Configuration for the outbox.
///
/// `None` on any of the limits means "no limit", not zero.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutboxConfig {
    /// SQLite file holding the queue. `None` keeps the queue in memory.
    #[serde(default)]
    pub db_path: Option<String>,

    /// Drop records older than this (default: 30 days)
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: Option<u64>,

    /// Drop records that failed this many times (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: Option<u32>,

    /// Records sent per cycle (default: 10)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: Option<usize>,

    /// Store cap applied after every cycle (default: 100)
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: Option<usize>,

    /// Periodic wake in seconds (0 = disabled)
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Request a sync right after each enqueue
    #[serde(default = "default_sync_on_enqueue")]
    pub sync_on_enqueue: bool,

    /// Timeout for each HTTP send
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Endpoint records are POSTed to
    #[serde(default)]
    pub submit_url: Option<String>,

    /// Endpoint handing out the session CSRF token
    #[serde(default)]
    pub credential_url: Option<String>,

    /// Endpoint receiving per-cycle metrics
    #[serde(default)]
    pub sync_log_url: Option<String>,
}

fn default_max_age_ms() -> Option<u64> { Some(30 * 24 * 60 * 60 * 1000) } // 30 days
fn default_max_retries() -> Option<u32> { Some(5) }
fn default_max_batch_size() -> Option<usize> { Some(10) }
fn default_max_queue_size() -> Option<usize> { Some(100) }
fn default_sync_interval_secs() -> u64 { 60 }
fn default_sync_on_enqueue() -> bool { true }
fn default_send_timeout_ms() -> u64 { 30_000 }

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_age_ms: default_max_age_ms(),
            max_retries: default_max_retries(),
            max_batch_size: default_max_batch_size(),
            max_queue_size: default_max_queue_size(),
            sync_interval_secs: default_sync_interval_secs(),
            sync_on_enqueue: default_sync_on_enqueue(),
            send_timeout_ms: default_send_timeout_ms(),
            submit_url: None,
            credential_url: None,
            sync_log_url: None,
        }
    }
}

impl OutboxConfig {
    #[must_use]
    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy::new(self.max_age_ms, self.max_retries)
    }

    /// Periodic wake, or `None` when disabled.
    #[must_use]
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }

    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }
}
