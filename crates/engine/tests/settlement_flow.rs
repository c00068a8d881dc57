mod common;

use common::{counter, World, CARD_X, CARD_Y};
use core_types::{RoleFilter, TradeAction, TradeLine, TradeLines, TradeStatus};
use engine::{CounterOfferChain, CreateTrade, EngineError, TradeFilter};
use store::TradeStore;
use uuid::Uuid;

#[tokio::test]
async fn offer_accept_confirm_settles_both_sides() {
    let world = World::new().await;

    // Alice offers 3×X for 1×Y.
    let created = world.service.create_trade("alice", world.offer(3, 1)).await.unwrap();
    let trade_id = created.trade.trade_id;
    assert_eq!(created.trade.status, TradeStatus::Pending);
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 3)));
    assert_eq!(created.escrow_cards[0].name.as_deref(), Some("Jinx, Loose Cannon"));
    assert_eq!(created.initiator_name.as_deref(), Some("Alice"));
    assert_eq!(created.chain.len(), 1);

    // Bob accepts, which locks his side and confirms for him.
    let accepted = world.service.accept_trade(trade_id, "bob").await.unwrap();
    assert_eq!(accepted.trade.status, TradeStatus::Accepted);
    assert!(accepted.trade.recipient_confirmed);
    assert_eq!(world.counts(world.bob_inv, CARD_Y).await, Some((4, 1)));

    // Alice confirms and the trade settles.
    let completed = world.service.confirm_trade(trade_id, "alice").await.unwrap();
    assert_eq!(completed.trade.status, TradeStatus::Completed);
    assert!(completed.trade.initiator_confirmed && completed.trade.recipient_confirmed);
    assert!(completed.trade.resolved_at.is_some());

    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((2, 0)));
    assert_eq!(world.counts(world.alice_inv, CARD_Y).await, Some((1, 0)));
    assert_eq!(world.counts(world.bob_inv, CARD_Y).await, Some((3, 0)));
    assert_eq!(world.counts(world.bob_inv, CARD_X).await, Some((3, 0)));

    let history = world.service.get_history(trade_id).await.unwrap();
    let actions: Vec<TradeAction> = history.history.iter().map(|h| h.entry.action).collect();
    assert_eq!(
        actions,
        vec![TradeAction::Created, TradeAction::Accepted, TradeAction::Completed]
    );
    let sequence: Vec<i64> = history.history.iter().map(|h| h.entry.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
    assert_eq!(history.history[1].actor_name.as_deref(), Some("Bob"));
}

#[tokio::test]
async fn counter_offer_releases_escrow_and_keeps_the_root() {
    let world = World::new().await;
    let original = world.service.create_trade("alice", world.offer(3, 1)).await.unwrap().trade;

    // Bob answers with 2×Y for 1×X.
    let countered = world
        .service
        .counter_offer(
            original.trade_id,
            "bob",
            counter(vec![TradeLine::new(CARD_Y, 2)], vec![TradeLine::new(CARD_X, 1)]),
        )
        .await
        .unwrap();

    let parent = world.service.get_trade(original.trade_id).await.unwrap().trade;
    assert_eq!(parent.status, TradeStatus::Countered);
    assert!(parent.resolved_at.is_some());
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 0)));
    assert_eq!(world.counts(world.bob_inv, CARD_Y).await, Some((4, 2)));

    let child = countered.trade;
    assert_eq!(child.root_trade_id, original.trade_id);
    assert_eq!(child.parent_trade_id, Some(original.trade_id));
    assert_eq!(child.counter_count, 1);
    assert_eq!(child.initiator_user_id, "bob");
    assert_eq!(child.initiator_inventory_id, world.bob_inv);
    assert_eq!(child.status, TradeStatus::Pending);
    assert_eq!(countered.chain.len(), 2);

    // Alice counters back; the chain grows and still has one open offer.
    let third = world
        .service
        .counter_offer(
            child.trade_id,
            "alice",
            counter(vec![TradeLine::new(CARD_X, 2)], vec![TradeLine::new(CARD_Y, 2)]),
        )
        .await
        .unwrap();
    assert_eq!(third.trade.counter_count, 2);
    assert_eq!(third.trade.root_trade_id, original.trade_id);
    assert_eq!(world.counts(world.bob_inv, CARD_Y).await, Some((4, 0)));
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 2)));
    let open = third.chain.iter().filter(|link| !link.status.is_terminal()).count();
    assert_eq!(open, 1);

    // History of any offer in the chain is the whole chain.
    let history = world.service.get_history(original.trade_id).await.unwrap();
    let actions: Vec<TradeAction> = history.history.iter().map(|h| h.entry.action).collect();
    assert_eq!(
        actions,
        vec![TradeAction::Created, TradeAction::CounterOffered, TradeAction::CounterOffered]
    );
    assert_eq!(history.root_trade_id, original.trade_id);
}

#[tokio::test]
async fn self_transfer_completes_immediately() {
    let world = World::new().await;
    let request = CreateTrade {
        initiator_inventory_id: world.alice_inv,
        recipient_user_id: "alice".to_string(),
        recipient_inventory_id: world.alice_vault,
        escrow_cards: vec![TradeLine::new(CARD_X, 2)],
        requested_cards: Vec::new(),
        message: Some("moving to the binder".to_string()),
    };
    // Self-transfers skip the tradeable check.
    world
        .store
        .put_holding(core_types::Holding::new(world.alice_inv, CARD_X, 5, false))
        .await;

    let view = world.service.create_trade("alice", request).await.unwrap();
    assert_eq!(view.trade.status, TradeStatus::Completed);
    assert!(view.trade.initiator_confirmed && view.trade.recipient_confirmed);
    assert!(view.trade.resolved_at.is_some());
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((3, 0)));
    assert_eq!(world.counts(world.alice_vault, CARD_X).await, Some((2, 0)));

    let history = world.service.get_history(view.trade.trade_id).await.unwrap();
    let actions: Vec<TradeAction> = history.history.iter().map(|h| h.entry.action).collect();
    assert_eq!(actions, vec![TradeAction::Created, TradeAction::Completed]);
}

#[tokio::test]
async fn offering_more_than_available_changes_nothing() {
    let world = World::new().await;
    world.service.create_trade("alice", world.offer(3, 0)).await.unwrap();
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 3)));

    let err = world.service.create_trade("alice", world.offer(4, 0)).await.unwrap_err();
    match err {
        EngineError::InsufficientAvailable {
            requested, available, ..
        } => assert_eq!((requested, available), (4, 2)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 3)));
    assert_eq!(world.store.trade_count().await, 1);
}

#[tokio::test]
async fn second_cancel_fails_and_unlocks_nothing() {
    let world = World::new().await;
    world.service.create_trade("alice", world.offer(1, 0)).await.unwrap();
    let trade = world.service.create_trade("alice", world.offer(3, 0)).await.unwrap().trade;
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 4)));

    let cancelled = world
        .service
        .cancel_trade(trade.trade_id, "alice", Some("changed my mind".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.trade.status, TradeStatus::Cancelled);
    assert_eq!(cancelled.trade.cancel_reason.as_deref(), Some("changed my mind"));
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 1)));

    let err = world.service.cancel_trade(trade.trade_id, "alice", None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 1)));
}

#[tokio::test]
async fn reject_returns_escrow() {
    let world = World::new().await;
    let trade = world.service.create_trade("alice", world.offer(2, 1)).await.unwrap().trade;
    let rejected = world.service.reject_trade(trade.trade_id, "bob").await.unwrap();
    assert_eq!(rejected.trade.status, TradeStatus::Rejected);
    assert!(rejected.trade.resolved_at.is_some());
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 0)));
    assert_eq!(world.counts(world.bob_inv, CARD_Y).await, Some((4, 0)));
}

#[tokio::test]
async fn actions_are_guarded_by_role_and_status() {
    let world = World::new().await;
    let trade = world.service.create_trade("alice", world.offer(1, 1)).await.unwrap().trade;
    let id = trade.trade_id;

    assert!(matches!(
        world.service.accept_trade(id, "alice").await.unwrap_err(),
        EngineError::Forbidden(_)
    ));
    assert!(matches!(
        world.service.cancel_trade(id, "bob", None).await.unwrap_err(),
        EngineError::Forbidden(_)
    ));
    assert!(matches!(
        world.service.reject_trade(id, "mallory").await.unwrap_err(),
        EngineError::Forbidden(_)
    ));
    assert!(matches!(
        world.service.confirm_trade(id, "alice").await.unwrap_err(),
        EngineError::InvalidState(_)
    ));
    assert!(matches!(
        world.service.accept_trade(Uuid::new_v4(), "bob").await.unwrap_err(),
        EngineError::NotFound(_)
    ));

    world.service.accept_trade(id, "bob").await.unwrap();
    assert!(matches!(
        world.service.confirm_trade(id, "bob").await.unwrap_err(),
        EngineError::InvalidState(_)
    ));
    assert!(matches!(
        world.service.counter_offer(id, "bob", counter(vec![TradeLine::new(CARD_Y, 1)], Vec::new())).await.unwrap_err(),
        EngineError::InvalidState(_)
    ));
}

#[tokio::test]
async fn unconfirm_withdraws_only_a_lone_confirmation() {
    let world = World::new().await;
    let id = world.service.create_trade("alice", world.offer(1, 1)).await.unwrap().trade.trade_id;
    world.service.accept_trade(id, "bob").await.unwrap();

    let err = world.service.unconfirm_trade(id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let view = world.service.unconfirm_trade(id, "bob").await.unwrap();
    assert_eq!(view.trade.status, TradeStatus::Accepted);
    assert!(!view.trade.recipient_confirmed);
    assert_eq!(view.trade.recipient_confirmed_at, None);
    // Bob's side stays locked while the trade is accepted.
    assert_eq!(world.counts(world.bob_inv, CARD_Y).await, Some((4, 1)));

    // One confirmation is no longer enough.
    let view = world.service.confirm_trade(id, "alice").await.unwrap();
    assert_eq!(view.trade.status, TradeStatus::Accepted);
    let view = world.service.confirm_trade(id, "bob").await.unwrap();
    assert_eq!(view.trade.status, TradeStatus::Completed);

    let actions: Vec<TradeAction> = world
        .service
        .get_history(id)
        .await
        .unwrap()
        .history
        .iter()
        .map(|h| h.entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            TradeAction::Created,
            TradeAction::Accepted,
            TradeAction::Unconfirmed,
            TradeAction::Confirmed,
            TradeAction::Completed,
        ]
    );
}

#[tokio::test]
async fn create_validates_input_and_ownership() {
    let world = World::new().await;

    let err = world.service.create_trade("alice", world.offer(0, 0)).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let mut no_escrow = world.offer(1, 0);
    no_escrow.escrow_cards.clear();
    assert!(matches!(
        world.service.create_trade("alice", no_escrow).await.unwrap_err(),
        EngineError::Validation(_)
    ));

    let mut long_message = world.offer(1, 0);
    long_message.message = Some("x".repeat(501));
    assert!(matches!(
        world.service.create_trade("alice", long_message).await.unwrap_err(),
        EngineError::Validation(_)
    ));

    // Bob cannot offer from Alice's inventory.
    assert!(matches!(
        world.service.create_trade("bob", world.offer(1, 0)).await.unwrap_err(),
        EngineError::NotFound(_)
    ));

    let mut unknown = world.offer(1, 0);
    unknown.recipient_inventory_id = Uuid::new_v4();
    assert!(matches!(
        world.service.create_trade("alice", unknown).await.unwrap_err(),
        EngineError::NotFound(_)
    ));

    // Asking for a card Bob does not own.
    let mut missing = world.offer(1, 0);
    missing.requested_cards = vec![TradeLine::new("SFD-001", 1)];
    assert!(matches!(
        world.service.create_trade("alice", missing).await.unwrap_err(),
        EngineError::InsufficientAvailable { available: 0, .. }
    ));
    assert_eq!(world.store.trade_count().await, 0);
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 0)));
}

#[tokio::test]
async fn untradeable_cards_cannot_be_offered_to_others() {
    let world = World::new().await;
    world
        .store
        .put_holding(core_types::Holding::new(world.alice_inv, CARD_X, 5, false))
        .await;
    let err = world.service.create_trade("alice", world.offer(1, 0)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotTradeable { .. }));
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 0)));
}

#[tokio::test]
async fn listing_and_summary() {
    let world = World::new().await;
    let done = world.service.create_trade("alice", world.offer(2, 1)).await.unwrap().trade.trade_id;
    world.service.accept_trade(done, "bob").await.unwrap();
    world.service.confirm_trade(done, "alice").await.unwrap();
    let cancelled = world.service.create_trade("alice", world.offer(1, 0)).await.unwrap().trade.trade_id;
    world.service.cancel_trade(cancelled, "alice", None).await.unwrap();
    world.service.create_trade("alice", world.offer(1, 0)).await.unwrap();

    let all = world.service.list_trades("bob", TradeFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let pending = TradeFilter {
        status: Some(TradeStatus::Pending),
        role: RoleFilter::Any,
    };
    assert_eq!(world.service.list_trades("alice", pending).await.unwrap().len(), 1);
    let as_initiator = TradeFilter {
        status: None,
        role: RoleFilter::Initiator,
    };
    assert!(world.service.list_trades("bob", as_initiator).await.unwrap().is_empty());

    let summary = world.service.trade_summary("alice").await.unwrap();
    assert_eq!(
        (summary.total, summary.pending, summary.completed, summary.cancelled),
        (3, 1, 1, 1)
    );
    assert_eq!((summary.cards_traded, summary.cards_received), (2, 1));
}

#[tokio::test]
async fn cleanup_drops_lines_of_old_trades_only() {
    let world = World::new().await;
    let old = world.service.create_trade("alice", world.offer(1, 1)).await.unwrap().trade.trade_id;
    world.service.reject_trade(old, "bob").await.unwrap();
    let open = world.service.create_trade("alice", world.offer(1, 1)).await.unwrap().trade.trade_id;
    world
        .store
        .set_resolved_at(old, chrono::Utc::now() - chrono::Duration::days(40))
        .await;

    let preview = world.service.cleanup(None, true).await.unwrap();
    assert_eq!(preview.retention_days, 30);
    assert_eq!((preview.trades_affected, preview.escrow_lines, preview.requested_lines), (1, 1, 1));

    let report = world.service.cleanup(Some(30), false).await.unwrap();
    assert_eq!(report.trades_affected, 1);
    let old_view = world.service.get_trade(old).await.unwrap();
    assert!(old_view.escrow_cards.is_empty() && old_view.requested_cards.is_empty());
    assert_eq!(world.service.get_history(old).await.unwrap().history.len(), 2);
    assert_eq!(world.service.get_trade(open).await.unwrap().escrow_cards.len(), 1);

    assert!(matches!(
        world.service.cleanup(Some(0), true).await.unwrap_err(),
        EngineError::Validation(_)
    ));
}

#[tokio::test]
async fn unknown_trade_history_is_not_found() {
    let world = World::new().await;
    let err = world.service.get_history(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn counter_refuses_a_chain_with_another_open_offer() {
    let world = World::new().await;
    let root = world.service.create_trade("alice", world.offer(3, 1)).await.unwrap().trade;

    // A second open record written behind the engine's back.
    let stray = CounterOfferChain::derive(&root, None, chrono::Utc::now());
    let lines = TradeLines::new(vec![TradeLine::new(CARD_Y, 1)], Vec::new());
    world.store.insert_trade(&stray, &lines).await.unwrap();

    let err = world
        .service
        .counter_offer(root.trade_id, "bob", counter(vec![TradeLine::new(CARD_Y, 2)], Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let parent = world.service.get_trade(root.trade_id).await.unwrap().trade;
    assert_eq!(parent.status, TradeStatus::Pending);
    assert_eq!(world.counts(world.alice_inv, CARD_X).await, Some((5, 3)));
    assert_eq!(world.counts(world.bob_inv, CARD_Y).await, Some((4, 0)));
    assert_eq!(world.store.trade_count().await, 2);
}
