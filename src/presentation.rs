//! User-facing error state with manual retry.
//!
//! Separate from the client's own automatic retries: this tracks what the
//! user sees after a call has already failed terminally, and how many times
//! they asked to try again.

use crate::api::ClassifiedError;
use serde::Serialize;
use std::future::Future;

/// Manual retries allowed per error episode.
pub const MAX_MANUAL_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Error,
    Retrying,
}

/// What the UI should offer for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Affordances {
    pub retry: bool,
    pub dismiss: bool,
    pub max_retries_reached: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorPresentationState {
    error: Option<ClassifiedError>,
    retry_count: u32,
    is_retrying: bool,
}

impl ErrorPresentationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        match (&self.error, self.is_retrying) {
            (_, true) => Phase::Retrying,
            (Some(_), false) => Phase::Error,
            (None, false) => Phase::Idle,
        }
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn error(&self) -> Option<&ClassifiedError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn is_retrying(&self) -> bool {
        self.is_retrying
    }

    /// Start a new episode with `error`.
    pub fn set_error(&mut self, error: ClassifiedError) {
        self.error = Some(error);
        self.retry_count = 0;
        self.is_retrying = false;
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        !self.is_retrying
            && self.retry_count < MAX_MANUAL_RETRIES
            && self.error.as_ref().is_some_and(|e| e.retryable)
    }

    #[must_use]
    pub fn max_retries_reached(&self) -> bool {
        self.retry_count >= MAX_MANUAL_RETRIES && self.error.as_ref().is_some_and(|e| e.retryable)
    }

    #[must_use]
    pub fn affordances(&self) -> Affordances {
        Affordances {
            retry: self.can_retry(),
            dismiss: self.has_error(),
            max_retries_reached: self.max_retries_reached(),
        }
    }

    /// Run `operation` as a manual retry of the current error.
    ///
    /// Returns `None` without calling `operation` when retrying is not
    /// allowed. Success clears the error; failure replaces it and keeps the
    /// episode's retry count. Dropping the returned future mid-flight leaves
    /// the current error in place and the attempt counted.
    pub async fn retry<T, F, Fut>(&mut self, operation: F) -> Option<Result<T, ClassifiedError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        if !self.can_retry() {
            return None;
        }

        self.retry_count += 1;
        let result = {
            let _in_flight = InFlight::start(&mut self.is_retrying);
            operation().await
        };

        match &result {
            Ok(_) => {
                self.error = None;
                self.retry_count = 0;
            }
            Err(err) => self.error = Some(err.clone()),
        }
        Some(result)
    }

    pub fn dismiss(&mut self) {
        *self = Self::default();
    }
}

/// Holds the retrying flag up for as long as it lives.
struct InFlight<'a>(&'a mut bool);

impl<'a> InFlight<'a> {
    fn start(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorKind;
    use std::cell::Cell;
    use std::time::Duration;

    fn server_error() -> ClassifiedError {
        ClassifiedError::new(ErrorKind::Server).with_status(503)
    }

    #[test]
    fn test_starts_idle() {
        let state = ErrorPresentationState::new();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(!state.has_error());
        assert_eq!(state.affordances(), Affordances::default());
    }

    #[test]
    fn test_set_error_resets_count() {
        let mut state = ErrorPresentationState::new();
        state.set_error(server_error());
        state.retry_count = 2;

        state.set_error(ClassifiedError::new(ErrorKind::Network));
        assert_eq!(state.phase(), Phase::Error);
        assert_eq!(state.retry_count(), 0);
        assert_eq!(state.error().unwrap().kind, ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_successful_retry_returns_to_idle() {
        let mut state = ErrorPresentationState::new();
        state.set_error(server_error());

        let result = state.retry(|| async { Ok::<_, ClassifiedError>(42) }).await;
        assert_eq!(result, Some(Ok(42)));
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_retry_keeps_count() {
        let mut state = ErrorPresentationState::new();
        state.set_error(server_error());

        let timeout = ClassifiedError::new(ErrorKind::Timeout);
        let result = state
            .retry(|| async { Err::<(), _>(timeout.clone()) })
            .await;
        assert!(matches!(result, Some(Err(_))));
        assert_eq!(state.phase(), Phase::Error);
        assert_eq!(state.retry_count(), 1);
        assert_eq!(state.error().unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_fourth_retry_is_noop() {
        let mut state = ErrorPresentationState::new();
        state.set_error(server_error());
        let calls = Cell::new(0);

        for _ in 0..3 {
            let result = state
                .retry(|| async {
                    calls.set(calls.get() + 1);
                    Err::<(), _>(server_error())
                })
                .await;
            assert!(result.is_some());
        }
        assert_eq!(state.retry_count(), 3);
        assert!(state.max_retries_reached());
        assert_eq!(
            state.affordances(),
            Affordances {
                retry: false,
                dismiss: true,
                max_retries_reached: true,
            }
        );

        let before = state.clone();
        let result = state
            .retry(|| async {
                calls.set(calls.get() + 1);
                Ok::<_, ClassifiedError>(())
            })
            .await;
        assert!(result.is_none());
        assert_eq!(calls.get(), 3);
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_non_retryable_offers_only_dismiss() {
        for kind in [ErrorKind::Validation, ErrorKind::Auth] {
            let mut state = ErrorPresentationState::new();
            state.set_error(ClassifiedError::new(kind));
            assert_eq!(
                state.affordances(),
                Affordances {
                    retry: false,
                    dismiss: true,
                    max_retries_reached: false,
                }
            );

            let result = state.retry(|| async { Ok::<_, ClassifiedError>(()) }).await;
            assert!(result.is_none());
            assert_eq!(state.phase(), Phase::Error);
        }
    }

    #[tokio::test]
    async fn test_retry_into_non_retryable_stops_offering_retry() {
        let mut state = ErrorPresentationState::new();
        state.set_error(server_error());
        state
            .retry(|| async { Err::<(), _>(ClassifiedError::new(ErrorKind::Auth)) })
            .await;
        assert!(!state.can_retry());
        assert!(!state.max_retries_reached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_retry_can_be_retried_again() {
        let mut state = ErrorPresentationState::new();
        state.set_error(server_error());

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            state.retry(std::future::pending::<Result<(), ClassifiedError>>),
        )
        .await;
        assert!(abandoned.is_err());

        assert!(!state.is_retrying());
        assert_eq!(state.phase(), Phase::Error);
        assert_eq!(state.retry_count(), 1);
        assert!(state.can_retry());

        let result = state.retry(|| async { Ok::<_, ClassifiedError>(()) }).await;
        assert_eq!(result, Some(Ok(())));
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn test_dismiss_from_any_state() {
        let mut state = ErrorPresentationState::new();
        state.dismiss();
        assert_eq!(state.phase(), Phase::Idle);

        state.set_error(server_error());
        state.retry_count = 3;
        state.dismiss();
        assert_eq!(state, ErrorPresentationState::default());
    }
}
