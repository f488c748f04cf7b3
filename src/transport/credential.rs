// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fetches a fresh CSRF token for the current session before each flush.
//!
//! The endpoint answers `{"message": {"csrf_token": "..."}}` (or a bare
//! `{"csrf_token": "..."}`) while the session is valid and 401/403 once it
//! has expired.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Credential, CredentialError, CredentialProvider, TransportError};

pub struct HttpCredentialProvider {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl HttpCredentialProvider {
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

    /// Add a header to the credential request (e.g. the session `Cookie`).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

fn extract_token(body: &Value) -> Option<&str> {
    body.pointer("/message/csrf_token")
        .or_else(|| body.get("csrf_token"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn fetch_credential(&self) -> Result<Credential, CredentialError> {
        let mut request = self.client.get(&self.url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            debug!(url = %self.url, error = %e, "Credential endpoint unreachable");
            CredentialError::Transient(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(url = %self.url, status = %status, "Session no longer valid");
            return Err(CredentialError::AuthDenied(format!("credential endpoint returned {}", status)));
        }
        if !status.is_success() {
            return Err(CredentialError::Transient(format!("credential endpoint returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CredentialError::Transient(format!("unreadable credential response: {}", e)))?;

        extract_token(&body)
            .map(Credential::new)
            .ok_or_else(|| CredentialError::Transient("credential response has no csrf_token".to_string()))
    }
}
