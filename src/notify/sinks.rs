// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Built-in [`ReportSink`] implementations.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ReportSink;
use crate::coordinator::FlushMetrics;
use crate::transport::TransportError;

/// Logs every cycle at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReportSink;

#[async_trait]
impl ReportSink for TracingReportSink {
    async fn report(&self, m: &FlushMetrics) {
        info!(
            queued_before = m.queued_before,
            queued_after = m.queued_after,
            processed = m.processed,
            succeeded = m.succeeded,
            failed = m.failed,
            dropped = m.dropped,
            "Flush cycle complete"
        );
    }
}

/// Feeds cycle counters into the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsReportSink;

#[async_trait]
impl ReportSink for MetricsReportSink {
    async fn report(&self, m: &FlushMetrics) {
        crate::metrics::record_flush(m);
    }
}

/// POSTs the metrics JSON to a backend sync-log endpoint.
///
/// Failures are logged and swallowed; a lost report never fails a cycle.
pub struct HttpReportSink {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl HttpReportSink {
    /// # Errors
    /// Returns `TransportError::Init` if the HTTP client cannot be created
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Init(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            headers: HashMap::new(),
        })
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn report(&self, m: &FlushMetrics) {
        let mut request = self.client.post(&self.url).json(m);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %self.url, "Sync log delivered");
            }
            Ok(response) => {
                warn!(url = %self.url, status = %response.status(), "Sync log rejected");
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Sync log unreachable");
            }
        }
    }
}

/// Reports to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutReportSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutReportSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ReportSink for FanoutReportSink {
    async fn report(&self, m: &FlushMetrics) {
        for sink in &self.sinks {
            sink.report(m).await;
        }
    }
}
