// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP transport: POSTs each payload as JSON.
//!
//! ```ignore
//! let transport = HttpTransport::new("https://erp.example.com/api/method/upsert_draft", timeout)?
//!     .credential_header("X-Frappe-CSRF-Token");
//! ```
//!
//! Every request carries the record id in `Idempotency-Key` so the server can
//! collapse the duplicates that at-least-once delivery produces.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Credential, SendOutcome, Transport, TransportError};
use crate::queued_record::QueuedRecord;

/// Header used for the session credential unless overridden
pub const DEFAULT_CREDENTIAL_HEADER: &str = "X-Frappe-CSRF-Token";
/// Header carrying the record id for server-side dedup
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub struct HttpTransport {
    client: Client,
    url: String,
    credential_header: String,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    /// Create a transport for `url`. `timeout` bounds every send.
    ///
    /// # Errors
    /// Returns `TransportError::Init` if the HTTP client cannot be created
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS).min(timeout))
            .build()
            .map_err(|e| TransportError::Init(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            headers: HashMap::new(),
        })
    }

    /// Header name the session credential is sent in.
    pub fn credential_header(mut self, name: impl Into<String>) -> Self {
        self.credential_header = name.into();
        self
    }

    /// Add a custom header to all requests
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &Value, record: &QueuedRecord, credential: &Credential) -> SendOutcome {
        let mut request = self
            .client
            .post(&self.url)
            .json(payload)
            .header(IDEMPOTENCY_HEADER, &record.id);

        if !credential.is_anonymous() {
            request = request.header(self.credential_header.as_str(), credential.token());
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!(id = %record.id, status = %status, "Record delivered");
                    SendOutcome::delivered(status.as_u16())
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!(id = %record.id, status = %status, body = %body, "Record rejected by server");
                    SendOutcome::rejected(status.as_u16())
                }
            }
            Err(e) => {
                warn!(id = %record.id, url = %self.url, timeout = e.is_timeout(), error = %e, "Send failed");
                SendOutcome::unreachable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::{HeaderMap, StatusCode}, routing::post, Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockServerState {
        received: Mutex<Vec<(HeaderMap, Value)>>,
        respond_with: AtomicU16,
    }

    async fn handle_submit(
        State(state): State<Arc<MockServerState>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        state.received.lock().await.push((headers, body));
        StatusCode::from_u16(state.respond_with.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
    }

    async fn handle_slow() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK
    }

    async fn start_mock_server(status: u16) -> (SocketAddr, Arc<MockServerState>) {
        let state = Arc::new(MockServerState::default());
        state.respond_with.store(status, Ordering::SeqCst);

        let app = Router::new()
            .route("/submit", post(handle_submit))
            .route("/slow", post(handle_slow))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, state)
    }

    fn record() -> QueuedRecord {
        QueuedRecord::from_parts("rec-42", "100", 0, r#"{"qty": 2}"#)
    }

    #[tokio::test]
    async fn test_send_success_posts_json_with_headers() {
        let (addr, state) = start_mock_server(200).await;
        let transport = HttpTransport::new(format!("http://{}/submit", addr), Duration::from_secs(5))
            .unwrap()
            .header("X-Client", "field-app");

        let outcome = transport
            .send(&json!({"qty": 2}), &record(), &Credential::new("csrf-123"))
            .await;

        assert_eq!(outcome, SendOutcome::delivered(200));
        let received = state.received.lock().await;
        assert_eq!(received.len(), 1);
        let (headers, body) = &received[0];
        assert_eq!(body, &json!({"qty": 2}));
        assert_eq!(headers.get(IDEMPOTENCY_HEADER).unwrap(), "rec-42");
        assert_eq!(headers.get(DEFAULT_CREDENTIAL_HEADER).unwrap(), "csrf-123");
        assert_eq!(headers.get("X-Client").unwrap(), "field-app");
    }

    #[tokio::test]
    async fn test_anonymous_send_has_no_credential_header() {
        let (addr, state) = start_mock_server(201).await;
        let transport = HttpTransport::new(format!("http://{}/submit", addr), Duration::from_secs(5))
            .unwrap()
            .credential_header("Authorization");

        let outcome = transport.send(&json!({}), &record(), &Credential::anonymous()).await;

        assert!(outcome.ok);
        let received = state.received.lock().await;
        assert!(received[0].0.get("Authorization").is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_not_ok() {
        let (addr, _state) = start_mock_server(500).await;
        let transport = HttpTransport::new(format!("http://{}/submit", addr), Duration::from_secs(5)).unwrap();

        let outcome = transport.send(&json!({}), &record(), &Credential::anonymous()).await;

        assert_eq!(outcome, SendOutcome::rejected(500));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(format!("http://{}/submit", addr), Duration::from_secs(2)).unwrap();
        let outcome = transport.send(&json!({}), &record(), &Credential::anonymous()).await;

        assert_eq!(outcome, SendOutcome::unreachable());
    }

    #[tokio::test]
    async fn test_timeout_is_unreachable() {
        let (addr, _state) = start_mock_server(200).await;
        let transport = HttpTransport::new(format!("http://{}/slow", addr), Duration::from_millis(100)).unwrap();

        let outcome = transport.send(&json!({}), &record(), &Credential::anonymous()).await;

        assert_eq!(outcome, SendOutcome::unreachable());
    }
}
