//! Queue storage backends.
//!
//! - [`traits`]: the [`QueueStore`](traits::QueueStore) contract and [`StorageError`](traits::StorageError)
//! - [`memory`]: `DashMap`-backed store, not durable
//! - [`sql`]: SQLite store that survives restarts

pub mod traits;
pub mod memory;
pub mod sql;
