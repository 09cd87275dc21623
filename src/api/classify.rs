//! Mapping raw transport outcomes to [`ClassifiedError`].
//!
//! Pure and deterministic: the same failure always yields the same kind and
//! retryability. Only the timestamp differs between calls.

use super::error::{ClassifiedError, ErrorKind};
use serde::Deserialize;

/// Wait used for a rate-limited response that names no delay.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// What went wrong with one attempt, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// No response: refused, reset, DNS, TLS.
    Connect { detail: String },
    /// The attempt's deadline elapsed.
    TimedOut { detail: String },
    /// A non-2xx response.
    Status {
        status: u16,
        retry_after: Option<String>,
        body: Option<String>,
    },
    /// A 2xx response whose body was not the expected envelope.
    Decode { status: u16, detail: String },
}

/// Error envelope the backend sends with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorEnvelope {
    message: Option<String>,
    details: Option<serde_json::Value>,
    error: Option<String>,
    code: Option<String>,
    retry_after: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    fn parse(body: Option<&str>) -> Self {
        body.and_then(|b| serde_json::from_str(b).ok())
            .unwrap_or_default()
    }

    /// Diagnostic text: `details`, else `error`/`code`.
    fn diagnostics(&self) -> Option<String> {
        if let Some(details) = &self.details {
            return Some(match details {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        match (&self.error, &self.code) {
            (Some(error), Some(code)) => Some(format!("{error} ({code})")),
            (Some(error), None) => Some(error.clone()),
            (None, Some(code)) => Some(code.clone()),
            (None, None) => None,
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self.retry_after.as_ref()? {
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|secs| secs.max(1))
                .or_else(|| n.as_f64().and_then(seconds_from_f64)),
            serde_json::Value::String(s) => parse_retry_after_value(s),
            _ => None,
        }
    }
}

/// Classify one failed attempt.
#[must_use]
pub fn classify(failure: &TransportFailure) -> ClassifiedError {
    match failure {
        TransportFailure::Connect { detail } => {
            ClassifiedError::new(ErrorKind::Network).with_details(detail.clone())
        }
        TransportFailure::TimedOut { detail } => {
            ClassifiedError::new(ErrorKind::Timeout).with_details(detail.clone())
        }
        TransportFailure::Decode { status, detail } => ClassifiedError::new(ErrorKind::Server)
            .with_status(*status)
            .with_details(format!("Failed to parse response: {detail}")),
        TransportFailure::Status {
            status,
            retry_after,
            body,
        } => classify_status(*status, retry_after.as_deref(), body.as_deref()),
    }
}

fn classify_status(status: u16, retry_after: Option<&str>, body: Option<&str>) -> ClassifiedError {
    let envelope = ErrorEnvelope::parse(body);
    let details = envelope
        .diagnostics()
        .or_else(|| body.filter(|b| !b.trim().is_empty()).map(str::to_string));

    let err = match status {
        400 => {
            let mut err = ClassifiedError::new(ErrorKind::Validation);
            if let Some(message) = envelope.message.as_deref().filter(|m| !m.is_empty()) {
                err = err.with_message(message);
            }
            err
        }
        401 => ClassifiedError::new(ErrorKind::Auth),
        429 => {
            let secs = retry_after
                .and_then(parse_retry_after_value)
                .or_else(|| envelope.retry_after_secs())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            ClassifiedError::new(ErrorKind::RateLimit).with_retry_after(secs)
        }
        s if s >= 500 => ClassifiedError::new(ErrorKind::Server),
        // Unexpected codes: only 5xx would be worth retrying, and none reach here.
        s => ClassifiedError::new(ErrorKind::Server)
            .with_message(format!("Unexpected response from server (HTTP {s})."))
            .with_retryable(s >= 500),
    };

    let err = err.with_status(status);
    match details {
        Some(details) => err.with_details(details),
        None => err,
    }
}

/// Parse a `Retry-After` value as seconds.
///
/// Integer and fractional seconds are accepted, fractions rounding up.
/// The server's value is not used verbatim at the low end: `0` (or anything
/// below one second) becomes 1, so a rate-limited retry always waits at
/// least a second. HTTP-date values and non-finite numbers yield `None`.
#[must_use]
pub fn parse_retry_after_value(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        Some(secs.max(1))
    } else if let Ok(f) = s.parse::<f64>() {
        seconds_from_f64(f)
    } else {
        None
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn seconds_from_f64(f: f64) -> Option<u64> {
    if f.is_finite() && f > 0.0 {
        Some((f.ceil() as u64).max(1))
    } else {
        None
    }
}
