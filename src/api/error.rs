//! Typed failures surfaced by the API client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure category. Exactly one per error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Validation,
    Auth,
    RateLimit,
    Server,
}

impl ErrorKind {
    /// Whether failures of this kind are worth another attempt.
    #[must_use]
    pub fn default_retryable(self) -> bool {
        match self {
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server => true,
            Self::Validation | Self::Auth => false,
        }
    }

    /// User-facing message used regardless of response body.
    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Network => {
                "Unable to connect to server. Please check your internet connection."
            }
            Self::Timeout => "Request timed out. Please try again.",
            Self::Validation => "Invalid request. Please check your input.",
            Self::Auth => "Authentication required. Please log in again.",
            Self::RateLimit => "Too many requests. Please wait before trying again.",
            Self::Server => "Server error. Please try again later.",
        }
    }

    /// Short label for logs and the CLI.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Network => "Network error",
            Self::Timeout => "Request timed out",
            Self::Validation => "Validation error",
            Self::Auth => "Authentication error",
            Self::RateLimit => "Rate limited",
            Self::Server => "Server error",
        }
    }

    /// Kinds for which a cached read may stand in for a live one.
    #[must_use]
    pub fn is_connectivity(self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One classified failure of one attempt.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_details: Option<String>,
    /// HTTP status, when a response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    /// Error with the kind's default message and retryability.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            retryable: kind.default_retryable(),
            retry_after_secs: None,
            raw_details: None,
            status: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.raw_details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Same failure, ignoring when it happened.
    #[must_use]
    pub fn same_failure(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.status == other.status
            && self.message == other.message
            && self.raw_details == other.raw_details
    }
}
