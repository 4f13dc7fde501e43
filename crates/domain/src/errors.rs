//! Error types for the leaderboard domain.
//!
//! Provider failures are classified once, here, into transient and permanent
//! kinds. Everything downstream branches on [`FailureKind`] instead of
//! inspecting messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a provider call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "status", rename_all = "snake_case")]
pub enum FailureKind {
    /// Request exceeded its timeout
    Timeout,
    /// 5xx (or 408) from the provider
    ServerError(u16),
    /// Provider rate-limit response
    RateLimited,
    /// Connection-level failure
    Network,
    /// Body could not be parsed or carried no usable choice
    MalformedResponse,
    /// Malformed request rejected by the provider
    BadRequest(u16),
    /// Content-policy rejection
    ContentPolicy,
    /// Missing, invalid or unauthorised credential
    InvalidCredential,
}

impl FailureKind {
    /// Transient failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ServerError(_)
                | Self::RateLimited
                | Self::Network
                | Self::MalformedResponse
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ServerError(_) => "server_error",
            Self::RateLimited => "rate_limited",
            Self::Network => "network",
            Self::MalformedResponse => "malformed_response",
            Self::BadRequest(_) => "bad_request",
            Self::ContentPolicy => "content_policy",
            Self::InvalidCredential => "invalid_credential",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerError(status) | Self::BadRequest(status) => {
                write!(f, "{} ({})", self.as_str(), status)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Structured failure of a generation, returned in place of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} after {attempts} attempt(s): {message}")]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

impl GenerationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FailureKind::Timeout.is_transient());
        assert!(FailureKind::ServerError(503).is_transient());
        assert!(FailureKind::RateLimited.is_transient());
        assert!(!FailureKind::BadRequest(400).is_transient());
        assert!(!FailureKind::ContentPolicy.is_transient());
        assert!(!FailureKind::InvalidCredential.is_transient());
    }

    #[test]
    fn test_failure_display() {
        let failure = GenerationFailure::new(FailureKind::ServerError(502), "bad gateway")
            .with_attempts(3);
        assert_eq!(failure.to_string(), "server_error (502) after 3 attempt(s): bad gateway");
    }
}
