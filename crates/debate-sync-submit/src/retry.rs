//! Bounded retry with exponential backoff around a ledger submission.
//!
//! Failures are classified by their message. Signatures that no retry can
//! fix (insufficient balance, already joined, user rejected the signature,
//! ...) propagate at once; anything else is retried up to `max_retries`
//! more times, sleeping `initial_delay_ms`, then multiplied by
//! `backoff_multiplier` per retry, capped at `max_delay_ms`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FatalKind, SubmissionError};

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let max = self.max_delay_ms as f64;
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if millis.is_finite() && millis >= 0.0 {
            millis.min(max)
        } else {
            max
        };
        Duration::from_millis(capped as u64)
    }
}

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal(FatalKind),
}

/// Message fragments (lowercase) that mark a failure as permanent.
const FATAL_SIGNATURES: &[(&str, FatalKind)] = &[
    ("insufficient balance", FatalKind::InsufficientBalance),
    ("insufficient funds", FatalKind::InsufficientBalance),
    ("already joined", FatalKind::AlreadyJoined),
    ("not pending", FatalKind::NotPending),
    ("expired", FatalKind::Expired),
    ("user rejected", FatalKind::UserRejected),
    ("user denied", FatalKind::UserRejected),
];

/// Classify an error message by case-insensitive substring match.
pub fn classify(message: &str) -> ErrorClass {
    let message = message.to_lowercase();
    FATAL_SIGNATURES
        .iter()
        .find(|(signature, _)| message.contains(signature))
        .map_or(ErrorClass::Retryable, |&(_, kind)| ErrorClass::Fatal(kind))
}

/// Runs fallible operations under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` with this executor's policy.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, SubmissionError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_with(&self.config, operation).await
    }

    /// Run `operation` with an explicit policy.
    pub async fn execute_with<F, Fut, T, E>(
        &self,
        config: &RetryConfig,
        mut operation: F,
    ) -> Result<T, SubmissionError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "submission succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let message = error.to_string();
            if let ErrorClass::Fatal(kind) = classify(&message) {
                tracing::info!(%kind, attempt, error = %message, "fatal submission error, not retrying");
                return Err(SubmissionError::Fatal { kind, error });
            }

            if attempt > config.max_retries {
                tracing::warn!(attempts = attempt, error = %message, "submission retries exhausted");
                return Err(SubmissionError::Exhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = config.delay_for(attempt);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "submission failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_classify_fatal_signatures() {
        assert_eq!(
            classify("execution reverted: Insufficient Balance"),
            ErrorClass::Fatal(FatalKind::InsufficientBalance)
        );
        assert_eq!(
            classify("MetaMask Tx Signature: User denied transaction signature."),
            ErrorClass::Fatal(FatalKind::UserRejected)
        );
        assert_eq!(
            classify("Debate is not pending"),
            ErrorClass::Fatal(FatalKind::NotPending)
        );
        assert_eq!(classify("nonce too low"), ErrorClass::Retryable);
        assert_eq!(classify("request timed out"), ErrorClass::Retryable);
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(config.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(config.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(config.delay_for(5), Duration::from_millis(10_000));
        assert_eq!(config.delay_for(500), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let executor = RetryExecutor::new(fast());

        let result = executor
            .execute(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("network error {}", n))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let executor = RetryExecutor::new(fast());

        let result: Result<(), _> = executor
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("insufficient balance for stake".to_string())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SubmissionError::Fatal { kind: FatalKind::InsufficientBalance, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let executor = RetryExecutor::new(fast());

        let result: Result<(), _> = executor
            .execute(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("rpc unavailable ({})", n))
            })
            .await;

        match result.unwrap_err() {
            SubmissionError::Exhausted { attempts, error } => {
                assert_eq!(attempts, 4);
                assert_eq!(error, "rpc unavailable (4)");
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_execute_with_overrides_policy() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let executor = RetryExecutor::default();
        let no_retry = RetryConfig {
            max_retries: 0,
            ..fast()
        };

        let result: Result<(), _> = executor
            .execute_with(&no_retry, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("timeout")
            })
            .await;

        assert!(matches!(result, Err(SubmissionError::Exhausted { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
