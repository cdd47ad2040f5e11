//! Service configuration.
//!
//! Every section has a `Default` and deserializes with missing fields
//! filled from it, so a host only spells out what it overrides. Durations
//! are in milliseconds.

use serde::{Deserialize, Serialize};

use debate_sync_ledger::{ListenerConfig, ReconcileConfig, DEFAULT_MAX_ATTEMPTS};
use debate_sync_submit::{RateLimitConfig, RetryConfig};

use crate::error::Result;

/// Configuration for [`crate::SyncService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub listener: ListenerConfig,
    pub reconcile: ReconcileConfig,
    /// Limit on join submissions per actor.
    pub join_rate_limit: RateLimitConfig,
    /// Default policy for `submit_with_retry`.
    pub retry: RetryConfig,
    /// Compare-and-swap attempts per handler call.
    pub max_write_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            reconcile: ReconcileConfig::default(),
            join_rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            max_write_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ServiceConfig {
    /// Parse from JSON, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
