// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed queue store.
//!
//! Records live in a single table keyed by id, with the creation time kept
//! twice: the original text (never rewritten) and a parsed epoch-millis
//! column that the oldest-first index is built on.
//!
//! ```sql
//! CREATE TABLE outbox_records (
//!   id TEXT PRIMARY KEY,
//!   created_at TEXT NOT NULL,        -- as enqueued (RFC 3339 or millis)
//!   created_at_ms INTEGER NOT NULL,  -- parsed; 0 when unparsable
//!   retry_count INTEGER NOT NULL DEFAULT 0,
//!   body TEXT NOT NULL
//! );
//! CREATE INDEX idx_outbox_created_at ON outbox_records (created_at_ms, id);
//! ```
//!
//! The file is opened in WAL journal mode so that a producer enqueue never
//! waits behind a flush cycle's reads.

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::path::Path;
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::traits::{QueueStore, StorageError};
use crate::queued_record::QueuedRecord;
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const SELECT_COLUMNS: &str = "SELECT id, created_at, retry_count, body FROM outbox_records";

pub struct SqlQueueStore {
    pool: AnyPool,
    url: String,
}

impl SqlQueueStore {
    /// Open (or create) the queue database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        Self::connect(&format!("sqlite://{}?mode=rwc", path_str)).await
    }

    /// Connect with a full SQLite connection string.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        install_drivers();

        if !url.starts_with("sqlite:") {
            return Err(StorageError::Backend(format!(
                "Unsupported queue database URL '{}': only sqlite is supported",
                url
            )));
        }

        let pool = retry("queue_db_open", &RetryConfig::storage_open(), || async {
            AnyPoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(url)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self {
            pool,
            url: url.to_string(),
        };
        store.enable_wal_mode().await?;
        store.init_schema().await?;

        let pending = store.count().await?;
        if pending > 0 {
            warn!(pending, url = %store.url, "Outbox has records from a previous session");
        } else {
            info!(url = %store.url, "Outbox database ready");
        }

        Ok(store)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        // NORMAL is durable across process crashes in WAL mode
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS outbox_records (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                body TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_outbox_created_at ON outbox_records (created_at_ms, id)",
        ];

        for sql in statements {
            retry("queue_db_schema", &RetryConfig::schema(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;
        }

        Ok(())
    }

    /// Up to `limit` records, oldest first, straight off the index.
    pub async fn oldest(&self, limit: usize) -> Result<Vec<QueuedRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY created_at_ms ASC, id ASC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }

    /// Fetch one record by id.
    pub async fn get(&self, id: &str) -> Result<Option<QueuedRecord>, StorageError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.as_ref().map(row_to_record).transpose()
    }
}

/// Read a TEXT column, tolerating drivers that surface it as bytes.
fn text_column(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<String, _>(column).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(column)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    })
}

/// Clamp a row count to SQLite's signed LIMIT/OFFSET range.
fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn row_to_record(row: &AnyRow) -> Result<QueuedRecord, StorageError> {
    let id = text_column(row, "id")
        .ok_or_else(|| StorageError::Backend("outbox row without id".to_string()))?;
    let created_at = text_column(row, "created_at").ok_or_else(|| StorageError::Corruption {
        id: id.clone(),
        reason: "created_at is not text".to_string(),
    })?;
    let retry_count: i64 = row.try_get("retry_count").map_err(|e| StorageError::Corruption {
        id: id.clone(),
        reason: format!("unreadable retry_count: {}", e),
    })?;
    let body = text_column(row, "body").ok_or_else(|| StorageError::Corruption {
        id: id.clone(),
        reason: "body is not valid UTF-8 text".to_string(),
    })?;

    let retry_count = u32::try_from(retry_count).map_err(|_| StorageError::Corruption {
        id: id.clone(),
        reason: format!("retry_count out of range: {}", retry_count),
    })?;

    Ok(QueuedRecord {
        id,
        created_at,
        retry_count,
        body,
    })
}

#[async_trait]
impl QueueStore for SqlQueueStore {
    async fn enqueue(&self, record: &QueuedRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO outbox_records (id, created_at, created_at_ms, retry_count, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.created_at)
        .bind(record.sort_key())
        .bind(i64::from(record.retry_count))
        .bind(&record.body)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StorageError::Duplicate(record.id.clone())
            }
            other => StorageError::Backend(other.to_string()),
        })?;

        debug!(id = %record.id, "Record persisted to outbox");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueuedRecord>, StorageError> {
        let rows = sqlx::query(SELECT_COLUMNS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn update(&self, record: &QueuedRecord) -> Result<(), StorageError> {
        // created_at is immutable, so only the mutable columns are written
        sqlx::query("UPDATE outbox_records SET retry_count = ?, body = ? WHERE id = ?")
            .bind(i64::from(record.retry_count))
            .bind(&record.body)
            .bind(&record.id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM outbox_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn trim_to_max(&self, max: usize) -> Result<usize, StorageError> {
        // Keep the newest `max` rows in one statement so a concurrent enqueue
        // cannot be counted against the cap twice.
        let result = sqlx::query(
            "DELETE FROM outbox_records WHERE id IN (
                SELECT id FROM outbox_records
                ORDER BY created_at_ms DESC, id DESC
                LIMIT -1 OFFSET ?
            )",
        )
        .bind(sql_limit(max))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let removed = result.rows_affected() as usize;
        if removed > 0 {
            debug!(removed, max, "Trimmed outbox to capacity");
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM outbox_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(count as usize)
    }
}
