// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Queued record data structure.
//!
//! A [`QueuedRecord`] is one pending submission sitting in the outbox. The
//! queue treats `body` as an opaque blob; only the flusher decodes it, right
//! before handing it to the transport.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One pending submission.
///
/// # Example
///
/// ```
/// use outbox_engine::QueuedRecord;
///
/// let record = QueuedRecord::new(r#"{"qty": 3}"#.to_string());
///
/// assert_eq!(record.retry_count, 0);
/// assert!(record.created_at_ms().is_some());
/// assert_eq!(record.decode_body().unwrap()["qty"], 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRecord {
    /// Unique id assigned at enqueue time (UUID v4)
    pub id: String,
    /// Creation timestamp, RFC 3339 or epoch millis. Never mutated.
    pub created_at: String,
    /// Failed send attempts so far
    pub retry_count: u32,
    /// Serialized payload (JSON text)
    pub body: String,
}

impl QueuedRecord {
    /// Create a fresh record stamped with a new id and the current time.
    pub fn new(body: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            retry_count: 0,
            body,
        }
    }

    /// Rebuild a record from stored columns.
    pub fn from_parts(
        id: impl Into<String>,
        created_at: impl Into<String>,
        retry_count: u32,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.into(),
            retry_count,
            body: body.into(),
        }
    }

    /// Creation time in epoch millis, or `None` when `created_at` is
    /// missing or unparsable.
    #[must_use]
    pub fn created_at_ms(&self) -> Option<i64> {
        parse_created_at(&self.created_at)
    }

    /// Ordering key for flush processing. Unparsable timestamps sort as
    /// epoch 0, ahead of every well-formed record.
    #[must_use]
    pub fn sort_key(&self) -> i64 {
        self.created_at_ms().unwrap_or(0)
    }

    /// Decode the body into the transport payload. An empty body decodes to
    /// an empty object.
    pub fn decode_body(&self) -> Result<Value, serde_json::Error> {
        if self.body.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.body)
    }

    /// Approximate stored size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.id.len() + self.created_at.len() + self.body.len() + std::mem::size_of::<u32>()
    }
}

/// Parse a `created_at` value: integer epoch millis or RFC 3339.
pub fn parse_created_at(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ms) = raw.parse::<i64>() {
        return Some(ms);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

/// Current wall clock in epoch millis.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
