//! Periodic reconciliation: re-derive lagging debates from the ledger.
//!
//! Each pass selects debates whose watermark trails the confirmed height
//! by more than the lag threshold, or that stayed unconfirmed past the
//! grace period. For each one it fetches the ledger's canonical view and
//! replays it through the same [`SyncHandlers`] the listener uses. Replays
//! of events already applied are duplicates or stale, so a pass over a
//! healthy projection writes nothing but watermarks.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use debate_sync_core::{now_millis, Debate, DebateId};
use debate_sync_store::{CandidateQuery, ProjectionStore};

use crate::error::{Result, SyncError};
use crate::handlers::SyncHandlers;
use crate::ledger::Ledger;

/// Configuration for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcileConfig {
    /// Period between scheduled passes.
    pub interval_ms: u64,
    /// Blocks a watermark may trail the confirmed height before repair.
    pub lag_threshold_blocks: u64,
    /// How long a debate may stay unconfirmed before repair.
    pub pending_grace_ms: i64,
    /// Maximum debates examined per pass.
    pub batch_limit: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5 * 60 * 1000,
            lag_threshold_blocks: 12,
            pending_grace_ms: 10 * 60 * 1000,
            batch_limit: 500,
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Candidate selection for a pass at `now` against `confirmed_height`.
    pub fn candidate_query(&self, confirmed_height: u64, now: i64) -> CandidateQuery {
        CandidateQuery {
            lagging_below: confirmed_height.saturating_sub(self.lag_threshold_blocks),
            unconfirmed_before: now.saturating_sub(self.pending_grace_ms),
            limit: self.batch_limit,
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    /// Ledger height the pass reconciled against.
    pub confirmed_height: u64,
    /// Candidates selected.
    pub examined: usize,
    /// Candidates where at least one event was applied.
    pub repaired: usize,
    /// Candidates already consistent with the ledger.
    pub unchanged: usize,
    /// Candidates the ledger has no record of.
    pub missing_on_ledger: Vec<DebateId>,
    /// Candidates where the stored state rejected a ledger event. The
    /// remaining events were still replayed.
    pub rejected: Vec<DebateId>,
    /// Candidates that failed; retried next pass.
    pub failed: Vec<DebateId>,
}

enum Reconciled {
    Repaired,
    Unchanged,
    MissingOnLedger,
}

struct Replay {
    outcome: Reconciled,
    rejected: usize,
}

struct Reconciler<S, L> {
    handlers: Arc<SyncHandlers<S>>,
    ledger: Arc<L>,
    config: ReconcileConfig,
}

impl<S: ProjectionStore, L: Ledger> Reconciler<S, L> {
    async fn run_pass(&self, now: i64) -> Result<ReconciliationReport> {
        let confirmed_height = self.ledger.confirmed_height().await?;
        let query = self.config.candidate_query(confirmed_height, now);
        let candidates = self
            .handlers
            .store()
            .list_reconciliation_candidates(&query)
            .await?;

        let mut report = ReconciliationReport {
            confirmed_height,
            examined: candidates.len(),
            ..Default::default()
        };

        for debate in &candidates {
            match self.reconcile_one(debate, confirmed_height, now).await {
                Ok(replay) => {
                    if replay.rejected > 0 {
                        report.rejected.push(debate.id);
                    }
                    match replay.outcome {
                        Reconciled::Repaired => report.repaired += 1,
                        Reconciled::Unchanged => report.unchanged += 1,
                        Reconciled::MissingOnLedger => report.missing_on_ledger.push(debate.id),
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        debate_id = %debate.id,
                        error = %e,
                        "reconciliation failed, will retry next pass"
                    );
                    report.failed.push(debate.id);
                }
            }
        }

        Ok(report)
    }

    async fn reconcile_one(&self, debate: &Debate, height: u64, now: i64) -> Result<Replay> {
        let id = debate.id;
        let canonical = self
            .ledger
            .debate_state(id)
            .await
            .map_err(|e| SyncError::ReconciliationFetch {
                debate_id: id,
                message: e.to_string(),
            })?;

        let mut rejected = 0;
        let outcome = match canonical {
            None => {
                tracing::debug!(debate_id = %id, "debate not found on ledger");
                Reconciled::MissingOnLedger
            }
            Some(canonical) => {
                let mut repaired = false;
                for event in canonical.events_through(height) {
                    match self.handlers.apply_at(&event, now).await {
                        Ok(outcome) => repaired |= outcome.is_applied(),
                        // A later event may still apply on top of the stored state
                        Err(e) if e.is_rejection() && !e.is_not_found() => {
                            tracing::warn!(
                                debate_id = %id,
                                event = %event.kind(),
                                block = event.block_number(),
                                error = %e,
                                "ledger event rejected during reconciliation"
                            );
                            rejected += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                if repaired {
                    tracing::info!(debate_id = %id, height, "repaired debate from ledger");
                    Reconciled::Repaired
                } else {
                    Reconciled::Unchanged
                }
            }
        };

        // Consistent with the ledger through `height`, whether or not
        // anything was written
        self.handlers
            .store()
            .advance_watermark(id, height, now)
            .await?;
        Ok(Replay { outcome, rejected })
    }
}

struct Running {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Runs reconciliation passes on demand or on a fixed interval.
pub struct ReconciliationService<S, L> {
    inner: Arc<Reconciler<S, L>>,
    running: Mutex<Option<Running>>,
}

impl<S, L> ReconciliationService<S, L>
where
    S: ProjectionStore + 'static,
    L: Ledger + 'static,
{
    pub fn new(handlers: Arc<SyncHandlers<S>>, ledger: Arc<L>, config: ReconcileConfig) -> Self {
        Self {
            inner: Arc::new(Reconciler {
                handlers,
                ledger,
                config,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.inner.config
    }

    /// Run one pass now.
    ///
    /// Fails only if the confirmed height or the candidate list cannot be
    /// read; per-debate failures are reported in the result.
    pub async fn run_pass(&self) -> Result<ReconciliationReport> {
        self.inner.run_pass(now_millis()).await
    }

    /// Run one pass as if the wall clock read `now`.
    pub async fn run_pass_at(&self, now: i64) -> Result<ReconciliationReport> {
        self.inner.run_pass(now).await
    }

    /// Start passes every `interval`, the first immediately.
    ///
    /// Returns false if the schedule is already running or `interval` is zero.
    pub async fn start(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            tracing::warn!("reconciliation interval must be positive");
            return false;
        }

        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => match inner.run_pass(now_millis()).await {
                        Ok(report) => tracing::info!(
                            confirmed_height = report.confirmed_height,
                            examined = report.examined,
                            repaired = report.repaired,
                            failed = report.failed.len(),
                            "reconciliation pass complete"
                        ),
                        Err(e) => tracing::warn!(error = %e, "reconciliation pass failed"),
                    },
                }
            }
        });

        *running = Some(Running {
            shutdown: shutdown_tx,
            handle,
        });
        tracing::info!(interval_ms = interval.as_millis() as u64, "reconciliation service started");
        true
    }

    /// Stop the schedule. Safe when not running; a pass in progress finishes.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.shutdown.send(());
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "reconciliation task ended abnormally");
        }
        tracing::info!("reconciliation service stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}
