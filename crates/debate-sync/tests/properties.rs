//! Property tests: at-least-once, unordered delivery converges.

use std::future::Future;
use std::sync::Arc;

use proptest::prelude::*;

use debate_sync::core::{Address, Debate, DebateStatus, LedgerEvent};
use debate_sync::ledger::{Disposition, SyncHandlers};
use debate_sync::store::{MemoryStore, ProjectionStore};
use debate_sync_testkit::generators::{
    event_below, out_of_order_delivery, two_source_delivery, DebateHistory,
};

const NOW: i64 = 1_700_000_000_000;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
        .block_on(future)
}

/// Apply `events` to a fresh store holding only the history's debate.
async fn project(history: &DebateHistory, events: &[LedgerEvent]) -> (SyncHandlers<MemoryStore>, Debate) {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_debate(&Debate::new(history.id, Address::ZERO, 0))
        .await
        .expect("insert");
    let handlers = SyncHandlers::new(store);
    for event in events {
        handlers.apply_at(event, NOW).await.expect("delivery applies");
    }
    let debate = handlers
        .store()
        .get_debate(history.id)
        .await
        .expect("read")
        .expect("debate exists");
    (handlers, debate)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Listener and reconciliation each deliver the full history in block
    /// order; any interleaving of the two ends in the block-ordered state.
    #[test]
    fn interleaved_deliveries_converge((history, deliveries) in two_source_delivery()) {
        let (ordered, interleaved) = block_on(async {
            let (_, ordered) = project(&history, &history.events()).await;
            let (_, interleaved) = project(&history, &deliveries).await;
            (ordered, interleaved)
        });
        prop_assert_eq!(ordered, interleaved);
    }

    /// A finalization that overtakes its join completes the debate; the
    /// late join is stale and never sets a challenger.
    #[test]
    fn late_join_leaves_challenger_unset((history, deliveries) in out_of_order_delivery()) {
        let finalization = history.finalization.clone().unwrap();
        let (late_join, debate) = block_on(async {
            let (handlers, _) = project(&history, &deliveries[..1]).await;
            let late_join = handlers
                .sync_joined(history.join.clone())
                .await
                .expect("join delivery");
            let (_, debate) = project(&history, &deliveries).await;
            (late_join, debate)
        });

        prop_assert_eq!(
            late_join.disposition,
            Disposition::Stale {
                incoming: history.join.block_number,
                stored: finalization.block_number,
            }
        );
        prop_assert_eq!(late_join.debate.challenger, None);
        prop_assert_eq!(debate.challenger, None);
        prop_assert_eq!(debate.status, DebateStatus::Completed);
        prop_assert_eq!(debate.on_chain_winner, Some(finalization.on_chain_winner));
    }

    /// Finalizing any number of times equals finalizing once.
    #[test]
    fn finalize_is_idempotent(history: DebateHistory, repeats in 1usize..5) {
        prop_assume!(history.finalization.is_some());
        let finalize = LedgerEvent::from(history.finalization.clone().unwrap());
        let once = vec![finalize.clone()];
        let many = vec![finalize; repeats];

        let (a, b) = block_on(async {
            let (_, a) = project(&history, &once).await;
            let (_, b) = project(&history, &many).await;
            (a, b)
        });
        prop_assert_eq!(a, b);
    }

    /// Events older than the stored block never change the debate.
    #[test]
    fn stale_events_change_nothing(
        (history, stale) in any::<DebateHistory>().prop_flat_map(|history| {
            let below = history.head_block();
            let id = history.id;
            (Just(history), prop::collection::vec(event_below(id, below), 1..6))
        })
    ) {
        let (before, after) = block_on(async {
            let (handlers, before) = project(&history, &history.events()).await;
            for event in &stale {
                let outcome = handlers.apply_at(event, NOW + 1).await.expect("stale applies");
                assert!(!outcome.is_applied());
            }
            let after = handlers
                .store()
                .get_debate(history.id)
                .await
                .expect("read")
                .expect("debate exists");
            (before, after)
        });

        prop_assert_eq!(before.status, after.status);
        prop_assert_eq!(before.winner, after.winner);
        prop_assert_eq!(before.challenger, after.challenger);
        prop_assert_eq!(before, after);
    }
}
