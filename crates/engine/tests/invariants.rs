//! Property tests: random action sequences against one pair of traders must
//! never break the holding invariant, lose or mint cards, leave two open
//! offers in a chain, or reuse a history sequence number.

mod common;

use common::{counter, World, CARD_X, CARD_Y};
use core_types::{TradeId, TradeLine, TradeRecord};
use proptest::prelude::*;
use std::collections::HashMap;
use store::{HistoryStore, TradeStore};

#[derive(Debug, Clone)]
enum Action {
    Offer { give: u32, want: u32 },
    Accept(usize),
    Reject(usize),
    Cancel(usize),
    Counter { pick: usize, give: u32, want: u32 },
    Confirm { pick: usize, by_initiator: bool },
    Unconfirm { pick: usize, by_initiator: bool },
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (1u32..=4, 0u32..=3).prop_map(|(give, want)| Action::Offer { give, want }),
        2 => any::<usize>().prop_map(Action::Accept),
        1 => any::<usize>().prop_map(Action::Reject),
        1 => any::<usize>().prop_map(Action::Cancel),
        2 => (any::<usize>(), 1u32..=3, 0u32..=3)
            .prop_map(|(pick, give, want)| Action::Counter { pick, give, want }),
        2 => (any::<usize>(), any::<bool>())
            .prop_map(|(pick, by_initiator)| Action::Confirm { pick, by_initiator }),
        1 => (any::<usize>(), any::<bool>())
            .prop_map(|(pick, by_initiator)| Action::Unconfirm { pick, by_initiator }),
    ]
}

fn pick(ids: &[TradeId], index: usize) -> Option<TradeId> {
    (!ids.is_empty()).then(|| ids[index % ids.len()])
}

/// The item a trade's initiator offers; the other card is the one asked for.
fn cards_of(trade: &TradeRecord, world: &World) -> (&'static str, &'static str) {
    if trade.initiator_inventory_id == world.alice_inv {
        (CARD_X, CARD_Y)
    } else {
        (CARD_Y, CARD_X)
    }
}

async fn apply(world: &World, ids: &mut Vec<TradeId>, action: Action) {
    let service = &world.service;
    match action {
        Action::Offer { give, want } => {
            if let Ok(view) = service.create_trade("alice", world.offer(give, want)).await {
                ids.push(view.trade.trade_id);
            }
        }
        Action::Accept(i) => {
            if let Some(id) = pick(ids, i) {
                let _ = service.accept_trade(id, "bob").await;
            }
        }
        Action::Reject(i) => {
            if let Some(id) = pick(ids, i) {
                let _ = service.reject_trade(id, "bob").await;
            }
        }
        Action::Cancel(i) => {
            if let Some(id) = pick(ids, i) {
                let _ = service.cancel_trade(id, "alice", None).await;
            }
        }
        Action::Counter { pick: i, give, want } => {
            let Some(id) = pick(ids, i) else { return };
            let Ok(view) = service.get_trade(id).await else { return };
            let trade = view.trade;
            // The counter-offerer gives from their own side.
            let (theirs, mine) = cards_of(&trade, world);
            let requested = if want > 0 { vec![TradeLine::new(theirs, want)] } else { Vec::new() };
            let request = counter(vec![TradeLine::new(mine, give)], requested);
            if let Ok(child) = service.counter_offer(id, &trade.recipient_user_id, request).await {
                ids.push(child.trade.trade_id);
            }
        }
        Action::Confirm { pick: i, by_initiator } | Action::Unconfirm { pick: i, by_initiator } => {
            let Some(id) = pick(ids, i) else { return };
            let Ok(view) = service.get_trade(id).await else { return };
            let actor = if by_initiator {
                view.trade.initiator_user_id.clone()
            } else {
                view.trade.recipient_user_id.clone()
            };
            let _ = match action {
                Action::Confirm { .. } => service.confirm_trade(id, &actor).await,
                _ => service.unconfirm_trade(id, &actor).await,
            };
        }
    }
}

async fn check_invariants(world: &World, ids: &[TradeId]) -> Result<(), TestCaseError> {
    let holdings = world.store.holdings().await;
    let mut totals: HashMap<String, u32> = HashMap::new();
    for holding in &holdings {
        prop_assert!(
            holding.locked_quantity <= holding.quantity,
            "locked exceeds quantity: {holding:?}"
        );
        prop_assert!(holding.quantity > 0, "empty row left behind: {holding:?}");
        *totals.entry(holding.item_id.clone()).or_default() += holding.quantity;
    }
    prop_assert_eq!(totals.get(CARD_X).copied().unwrap_or(0), 5);
    prop_assert_eq!(totals.get(CARD_Y).copied().unwrap_or(0), 4);

    // Every locked unit is backed by an open trade and vice versa.
    let mut expected_locks: HashMap<(uuid::Uuid, String), u32> = HashMap::new();
    let mut roots = Vec::new();
    for id in ids {
        let trade = world.store.get_trade(*id).await.unwrap().unwrap();
        roots.push(trade.root_trade_id);
        let lines = world.store.get_lines(*id).await.unwrap();
        if !trade.status.is_terminal() {
            for line in &lines.escrow {
                *expected_locks
                    .entry((trade.initiator_inventory_id, line.item_id.clone()))
                    .or_default() += line.quantity;
            }
        }
        if trade.status == core_types::TradeStatus::Accepted {
            for line in &lines.requested {
                *expected_locks
                    .entry((trade.recipient_inventory_id, line.item_id.clone()))
                    .or_default() += line.quantity;
            }
        }
    }
    for holding in &holdings {
        let expected = expected_locks
            .get(&(holding.inventory_id, holding.item_id.clone()))
            .copied()
            .unwrap_or(0);
        prop_assert_eq!(holding.locked_quantity, expected, "lock mismatch on {:?}", holding);
    }

    roots.sort();
    roots.dedup();
    for root in roots {
        let chain = world.store.chain(root).await.unwrap();
        let open = chain.iter().filter(|t| !t.status.is_terminal()).count();
        prop_assert!(open <= 1, "chain {root} has {open} open offers");

        let sequence: Vec<i64> = world
            .store
            .list_entries(root)
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence_number)
            .collect();
        prop_assert_eq!(sequence.clone(), (1..=sequence.len() as i64).collect::<Vec<_>>());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_negotiations_keep_every_invariant(actions in prop::collection::vec(arb_action(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let world = World::new().await;
            let mut ids = Vec::new();
            for action in actions {
                apply(&world, &mut ids, action).await;
                check_invariants(&world, &ids).await?;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
