//! The sync service: one context object per process.
//!
//! `SyncService` owns the handlers, the event listener, the reconciliation
//! schedule and the submission guards. HTTP adapters and the host process
//! hold it behind an `Arc` and call into it; nothing here is global.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use debate_sync_core::{Debate, DebateId};
use debate_sync_ledger::{
    EventListener, Ledger, ListenerState, ListenerStats, ReconciliationReport,
    ReconciliationService, SyncHandlers,
};
use debate_sync_store::{InsertResult, ProjectionStore};
use debate_sync_submit::{
    RateLimitConfig, RateLimitDecision, RateLimiter, RateLimiterRegistry, RetryConfig,
    RetryExecutor, SubmissionError, JOIN,
};

use crate::config::ServiceConfig;
use crate::error::{Result, SyncServiceError};
use crate::payload::{FinalizedPayload, JoinedPayload, PrizeClaimedPayload, SyncResponse};

/// Projection sync for one ledger and one store.
pub struct SyncService<S, L> {
    handlers: Arc<SyncHandlers<S>>,
    ledger: Arc<L>,
    config: ServiceConfig,
    listener: EventListener<S, L>,
    reconciliation: ReconciliationService<S, L>,
    rate_limits: RateLimiterRegistry,
    retry: RetryExecutor,
}

impl<S, L> SyncService<S, L>
where
    S: ProjectionStore + 'static,
    L: Ledger + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>, config: ServiceConfig) -> Self {
        let handlers =
            Arc::new(SyncHandlers::new(store).with_max_attempts(config.max_write_attempts));
        let listener = EventListener::new(handlers.clone(), ledger.clone(), config.listener.clone());
        let reconciliation =
            ReconciliationService::new(handlers.clone(), ledger.clone(), config.reconcile.clone());
        let rate_limits = RateLimiterRegistry::new(RateLimitConfig::default())
            .with_limit(JOIN, config.join_rate_limit);
        let retry = RetryExecutor::new(config.retry);

        Self {
            handlers,
            ledger,
            config,
            listener,
            reconciliation,
            rate_limits,
            retry,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.handlers.store()
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Projection
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a newly created debate. Creation happens outside the sync
    /// path; re-registering an existing id changes nothing.
    pub async fn register_debate(&self, debate: &Debate) -> Result<InsertResult> {
        let result = self.store().insert_debate(debate).await?;
        if result == InsertResult::Inserted {
            tracing::info!(debate_id = %debate.id, creator = %debate.creator, "debate registered");
        }
        Ok(result)
    }

    pub async fn get_debate(&self, id: DebateId) -> Result<Option<Debate>> {
        Ok(self.store().get_debate(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Webhook Handlers
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn sync_joined(&self, payload: &JoinedPayload) -> Result<SyncResponse> {
        let event = payload.validate()?;
        let outcome = self.handlers.sync_joined(event).await?;
        Ok(SyncResponse::from(outcome))
    }

    pub async fn sync_finalized(&self, payload: &FinalizedPayload) -> Result<SyncResponse> {
        let event = payload.validate()?;
        let outcome = self.handlers.sync_finalized(event).await?;
        Ok(SyncResponse::from(outcome))
    }

    pub async fn sync_prize_claimed(&self, payload: &PrizeClaimedPayload) -> Result<SyncResponse> {
        let event = payload.validate()?;
        let outcome = self.handlers.sync_prize_claimed(event).await?;
        Ok(SyncResponse::from(outcome))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission Guards
    // ─────────────────────────────────────────────────────────────────────────

    pub fn can_attempt_join(&self, actor: &str) -> RateLimitDecision {
        self.join_limiter().can_attempt(actor)
    }

    pub fn record_join_attempt(&self, actor: &str) {
        self.join_limiter().record_attempt(actor)
    }

    pub fn join_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limits.limiter(JOIN)
    }

    /// Run a ledger submission under the retry policy, or `config` if given.
    pub async fn submit_with_retry<F, Fut, T, E>(
        &self,
        operation: F,
        config: Option<RetryConfig>,
    ) -> std::result::Result<T, SubmissionError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        match config {
            Some(config) => self.retry.execute_with(&config, operation).await,
            None => self.retry.execute(operation).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Listener
    // ─────────────────────────────────────────────────────────────────────────

    /// Start consuming ledger events. No-op if already listening.
    pub async fn start_listening(&self) -> Result<()> {
        Ok(self.listener.start().await?)
    }

    /// Stop consuming ledger events. Safe when not listening.
    pub async fn stop_listening(&self) -> Result<()> {
        Ok(self.listener.stop().await?)
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_listening()
    }

    pub async fn listener_state(&self) -> ListenerState {
        self.listener.state().await
    }

    pub fn listener_stats(&self) -> ListenerStats {
        self.listener.stats()
    }

    pub fn last_processed_block(&self) -> u64 {
        self.listener.last_processed_block()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn run_reconciliation_pass(&self) -> Result<ReconciliationReport> {
        Ok(self.reconciliation.run_pass().await?)
    }

    /// Run a pass as if the wall clock read `now` (Unix ms).
    pub async fn run_reconciliation_pass_at(&self, now: i64) -> Result<ReconciliationReport> {
        Ok(self.reconciliation.run_pass_at(now).await?)
    }

    /// Run passes every `interval`, the first immediately. Returns false if
    /// the schedule is already running.
    ///
    /// `config().reconcile.interval()` is the configured period.
    pub async fn start_reconciliation_service(&self, interval: Duration) -> Result<bool> {
        if interval.is_zero() {
            return Err(SyncServiceError::InvalidOperation(
                "reconciliation interval must be positive".into(),
            ));
        }
        Ok(self.reconciliation.start(interval).await)
    }

    pub async fn stop_reconciliation_service(&self) {
        self.reconciliation.stop().await
    }

    pub async fn is_reconciling(&self) -> bool {
        self.reconciliation.is_running().await
    }

    /// Stop the listener and the reconciliation schedule.
    pub async fn shutdown(&self) -> Result<()> {
        self.reconciliation.stop().await;
        self.listener.stop().await?;
        tracing::info!("sync service shut down");
        Ok(())
    }
}
