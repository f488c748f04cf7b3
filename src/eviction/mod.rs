//! Eviction of stale queue records.
//!
//! A queued record is discarded unsent when it outlives the configured
//! time-to-live or exhausts its retry budget. [`policy::EvictionPolicy`] is a
//! pure function over one record and the current time; the flusher applies
//! it to every record at the start of a cycle.
//!
//! ```text
//! age > max_age_ms ──────────────► drop (age)
//!        │ no
//!        ▼
//! retry_count >= max_retries ────► drop (retries)
//!        │ no
//!        ▼
//!      keep
//! ```

pub mod policy;
