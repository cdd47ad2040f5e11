//! # Debate Sync Submit
//!
//! Guards around client submissions to the ledger.
//!
//! - [`RateLimiter`] - sliding-window admission per actor
//! - [`RateLimiterRegistry`] - one limiter per submission type
//! - [`RetryExecutor`] - bounded exponential backoff with fatal-error
//!   classification
//!
//! ## Usage
//!
//! ```rust,no_run
//! use debate_sync_submit::{RateLimiterRegistry, RetryExecutor, JOIN};
//!
//! async fn join(actor: &str) -> Result<(), String> {
//!     let limits = RateLimiterRegistry::default();
//!     let join_limiter = limits.limiter(JOIN);
//!     if !join_limiter.can_attempt(actor).allowed {
//!         return Err("too many join attempts".into());
//!     }
//!     join_limiter.record_attempt(actor);
//!
//!     RetryExecutor::default()
//!         .execute(|| async { Ok::<_, String>(()) })
//!         .await
//!         .map_err(|e| e.to_string())
//! }
//! ```

pub mod error;
pub mod rate_limit;
pub mod retry;

pub use error::{FatalKind, SubmissionError};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter, RateLimiterRegistry, JOIN};
pub use retry::{classify, ErrorClass, RetryConfig, RetryExecutor};
