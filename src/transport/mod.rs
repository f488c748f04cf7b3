// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Delivery boundary: sending one record and obtaining the session
//! credential a send needs.
//!
//! Both are supplied by the host. The queue never interprets a failed send
//! beyond "not ok": any transport problem, including a timeout, is reported
//! as [`SendOutcome::ok`] `== false` and drives a retry on the next cycle.

pub mod credential;
pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::queued_record::QueuedRecord;

pub use credential::HttpCredentialProvider;
pub use http::HttpTransport;

/// Result of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub ok: bool,
    /// HTTP-style status code; 0 when no response was received
    pub status: u16,
}

impl SendOutcome {
    #[must_use]
    pub fn delivered(status: u16) -> Self {
        Self { ok: true, status }
    }

    #[must_use]
    pub fn rejected(status: u16) -> Self {
        Self { ok: false, status }
    }

    /// No response at all (connection refused, DNS failure, timeout).
    #[must_use]
    pub fn unreachable() -> Self {
        Self { ok: false, status: 0 }
    }
}

/// Sends one decoded payload to the remote endpoint.
///
/// Implementations must not error for ordinary failures; they return a
/// non-ok [`SendOutcome`] instead. Sends should be bounded by a timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &Value, record: &QueuedRecord, credential: &Credential) -> SendOutcome;
}

/// Short-lived session credential attached to sends.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// No credential; transports send without an auth header.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { token: String::new() }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.token.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_anonymous() {
            write!(f, "Credential(anonymous)")
        } else {
            write!(f, "Credential(<redacted>)")
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The user's session is no longer valid; they must log in again.
    #[error("Session rejected: {0}")]
    AuthDenied(String),
    /// Network or server trouble; try again on the next trigger.
    #[error("Credential temporarily unavailable: {0}")]
    Transient(String),
}

/// Source of session credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch_credential(&self) -> Result<Credential, CredentialError>;
}

/// Always hands out the same credential.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credential);

impl StaticCredentials {
    pub fn new(credential: Credential) -> Self {
        Self(credential)
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self(Credential::anonymous())
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn fetch_credential(&self) -> Result<Credential, CredentialError> {
        Ok(self.0.clone())
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_outcome_constructors() {
        assert_eq!(SendOutcome::delivered(201), SendOutcome { ok: true, status: 201 });
        assert_eq!(SendOutcome::rejected(500), SendOutcome { ok: false, status: 500 });
        assert_eq!(SendOutcome::unreachable(), SendOutcome { ok: false, status: 0 });
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = Credential::new("s3cret-token");
        let shown = format!("{:?}", cred);
        assert!(!shown.contains("s3cret"));
        assert_eq!(format!("{:?}", Credential::anonymous()), "Credential(anonymous)");
    }

    #[test]
    fn test_anonymous_credential() {
        assert!(Credential::anonymous().is_anonymous());
        assert!(!Credential::new("t").is_anonymous());
        assert_eq!(Credential::new("t").token(), "t");
    }

    #[tokio::test]
    async fn test_static_credentials() {
        let provider = StaticCredentials::new(Credential::new("abc"));
        assert_eq!(provider.fetch_credential().await.unwrap().token(), "abc");

        let anon = StaticCredentials::anonymous();
        assert!(anon.fetch_credential().await.unwrap().is_anonymous());
    }

    #[test]
    fn test_credential_error_display() {
        let denied = CredentialError::AuthDenied("403".into());
        assert_eq!(denied.to_string(), "Session rejected: 403");
        let transient = CredentialError::Transient("timeout".into());
        assert!(transient.to_string().contains("timeout"));
    }
}
