//! Sliding-window rate limiting per actor.
//!
//! An actor may make at most `max_attempts` attempts in any window of
//! `window_ms`. History is process-local and pruned lazily on access.
//! Actors are keyed case-insensitively, so `0xAB..` and `0xab..` share a
//! budget.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use debate_sync_core::now_millis;

/// Submission type the core rate-limits.
pub const JOIN: &str = "join";

/// Limits for one submission type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_attempts: 3,
        }
    }
}

/// Answer to "may this actor attempt now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining_attempts: u32,
    /// When the oldest counted attempt leaves the window (Unix ms). Only set
    /// when denied.
    pub reset_time: Option<i64>,
}

/// Sliding-window limiter for one submission type.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    history: Mutex<HashMap<String, VecDeque<i64>>>,
}

fn actor_key(actor: &str) -> String {
    actor.trim().to_ascii_lowercase()
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn can_attempt(&self, actor: &str) -> RateLimitDecision {
        self.can_attempt_at(actor, now_millis())
    }

    pub fn record_attempt(&self, actor: &str) {
        self.record_attempt_at(actor, now_millis())
    }

    /// Check the actor's budget as of `now` (Unix ms).
    pub fn can_attempt_at(&self, actor: &str, now: i64) -> RateLimitDecision {
        let key = actor_key(actor);
        let mut history = self.lock();

        let (count, oldest) = match history.get_mut(&key) {
            Some(attempts) => {
                self.prune(attempts, now);
                (attempts.len(), attempts.front().copied())
            }
            None => (0, None),
        };
        if count == 0 {
            history.remove(&key);
        }

        let max = self.config.max_attempts as usize;
        if count >= max {
            RateLimitDecision {
                allowed: false,
                remaining_attempts: 0,
                reset_time: oldest.map(|t| t + self.config.window_ms),
            }
        } else {
            RateLimitDecision {
                allowed: true,
                remaining_attempts: (max - count) as u32,
                reset_time: None,
            }
        }
    }

    /// Record an attempt at `now` (Unix ms).
    pub fn record_attempt_at(&self, actor: &str, now: i64) {
        let mut history = self.lock();
        let attempts = history.entry(actor_key(actor)).or_default();
        attempts.push_back(now);
        self.prune(attempts, now);
    }

    /// Forget an actor's history.
    pub fn reset(&self, actor: &str) {
        self.lock().remove(&actor_key(actor));
    }

    /// Actors with at least one attempt on record.
    pub fn tracked_actors(&self) -> usize {
        self.lock().len()
    }

    /// Drop attempts that have left the window. An attempt at `t` counts
    /// while `now - t < window`.
    fn prune(&self, attempts: &mut VecDeque<i64>, now: i64) {
        let window = self.config.window_ms;
        // Attempts are appended in call order, which may not be clock order
        attempts.retain(|&t| now - t < window);
        attempts.make_contiguous().sort_unstable();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<i64>>> {
        // History is plain data; a panicked writer leaves it usable
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One limiter per submission type.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    default_config: RateLimitConfig,
    overrides: HashMap<String, RateLimitConfig>,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            default_config,
            ..Default::default()
        }
    }

    /// Use `config` for `kind` instead of the default.
    pub fn with_limit(mut self, kind: &str, config: RateLimitConfig) -> Self {
        self.overrides.insert(kind.to_string(), config);
        self
    }

    /// The limiter for `kind`, created on first use.
    pub fn limiter(&self, kind: &str) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
        limiters
            .entry(kind.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(kind)
                    .copied()
                    .unwrap_or(self.default_config);
                Arc::new(RateLimiter::new(config))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTOR: &str = "0xAbC0000000000000000000000000000000000001";

    #[test]
    fn test_fourth_attempt_denied() {
        let limiter = RateLimiter::new(RateLimitConfig::default());

        for (i, t) in [0, 1_000, 2_000].into_iter().enumerate() {
            let decision = limiter.can_attempt_at(ACTOR, t);
            assert!(decision.allowed);
            assert_eq!(decision.remaining_attempts, 3 - i as u32);
            assert_eq!(decision.reset_time, None);
            limiter.record_attempt_at(ACTOR, t);
        }

        let decision = limiter.can_attempt_at(ACTOR, 3_000);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining_attempts, 0);
        assert_eq!(decision.reset_time, Some(60_000));
    }

    #[test]
    fn test_allowed_again_after_window() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for t in [0, 1_000, 2_000] {
            limiter.record_attempt_at(ACTOR, t);
        }

        assert!(!limiter.can_attempt_at(ACTOR, 59_999).allowed);

        let decision = limiter.can_attempt_at(ACTOR, 60_000);
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 1);
    }

    #[test]
    fn test_actors_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window_ms: 1_000,
            max_attempts: 1,
        });
        limiter.record_attempt_at("alice", 0);
        assert!(!limiter.can_attempt_at("alice", 10).allowed);
        assert!(limiter.can_attempt_at("bob", 10).allowed);
    }

    #[test]
    fn test_actor_key_is_case_insensitive() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window_ms: 1_000,
            max_attempts: 1,
        });
        limiter.record_attempt_at(ACTOR, 0);
        assert!(!limiter.can_attempt_at(&ACTOR.to_lowercase(), 1).allowed);
    }

    #[test]
    fn test_reset_clears_history() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window_ms: 1_000,
            max_attempts: 1,
        });
        limiter.record_attempt_at(ACTOR, 0);
        limiter.reset(ACTOR);
        assert!(limiter.can_attempt_at(ACTOR, 1).allowed);
        assert_eq!(limiter.tracked_actors(), 0);
    }

    #[test]
    fn test_expired_history_pruned_on_access() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window_ms: 1_000,
            max_attempts: 3,
        });
        limiter.record_attempt_at("alice", 0);
        assert_eq!(limiter.tracked_actors(), 1);
        limiter.can_attempt_at("alice", 5_000);
        assert_eq!(limiter.tracked_actors(), 0);
    }

    #[test]
    fn test_registry_per_type_limits() {
        let registry = RateLimiterRegistry::new(RateLimitConfig::default()).with_limit(
            "claim",
            RateLimitConfig {
                window_ms: 1_000,
                max_attempts: 1,
            },
        );

        assert_eq!(registry.limiter(JOIN).config().max_attempts, 3);
        assert_eq!(registry.limiter("claim").config().max_attempts, 1);

        registry.limiter(JOIN).record_attempt_at(ACTOR, 0);
        // Same instance on every lookup
        assert_eq!(registry.limiter(JOIN).can_attempt_at(ACTOR, 1).remaining_attempts, 2);
        assert!(registry.limiter("claim").can_attempt_at(ACTOR, 1).allowed);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: RateLimitConfig = serde_json::from_str(r#"{"maxAttempts": 5}"#).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.window_ms, 60_000);
    }
}
