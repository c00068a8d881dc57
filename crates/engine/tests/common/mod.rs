#![allow(dead_code)]

use core_types::{Holding, HoldingKey, InventoryId, ItemDetails, TradeLine};
use engine::{CounterOffer, CreateTrade, EngineOptions, TradeService};
use std::sync::Arc;
use store::MemoryStore;
use uuid::Uuid;

pub const CARD_X: &str = "OGN-027";
pub const CARD_Y: &str = "OGN-112";

/// Alice holds 5×X in `alice_inv`, Bob holds 4×Y in `bob_inv`. Alice has a
/// second, empty inventory for self-transfers.
pub struct World {
    pub store: Arc<MemoryStore>,
    pub service: Arc<TradeService>,
    pub alice_inv: InventoryId,
    pub alice_vault: InventoryId,
    pub bob_inv: InventoryId,
}

impl World {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let (alice_inv, alice_vault, bob_inv) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.add_user("alice", "Alice").await;
        store.add_user("bob", "Bob").await;
        store.add_inventory(alice_inv, "alice").await;
        store.add_inventory(alice_vault, "alice").await;
        store.add_inventory(bob_inv, "bob").await;
        store.put_holding(Holding::new(alice_inv, CARD_X, 5, true)).await;
        store.put_holding(Holding::new(bob_inv, CARD_Y, 4, true)).await;
        for (item_id, name) in [(CARD_X, "Jinx, Loose Cannon"), (CARD_Y, "Yasuo, Unforgiven")] {
            store
                .add_item(ItemDetails {
                    item_id: item_id.to_string(),
                    name: name.to_string(),
                    image_url: None,
                    rarity: Some("rare".to_string()),
                    set_id: Some("OGN".to_string()),
                })
                .await;
        }
        let service = Arc::new(TradeService::new(store.clone(), EngineOptions::default()));
        Self {
            store,
            service,
            alice_inv,
            alice_vault,
            bob_inv,
        }
    }

    /// `(quantity, locked_quantity)` of a holding, `None` when the row is gone.
    pub async fn counts(&self, inventory_id: InventoryId, item_id: &str) -> Option<(u32, u32)> {
        self.store
            .holding(&HoldingKey::new(inventory_id, item_id))
            .await
            .map(|h| (h.quantity, h.locked_quantity))
    }

    /// Alice offers `give`×X and asks for `want`×Y.
    pub fn offer(&self, give: u32, want: u32) -> CreateTrade {
        CreateTrade {
            initiator_inventory_id: self.alice_inv,
            recipient_user_id: "bob".to_string(),
            recipient_inventory_id: self.bob_inv,
            escrow_cards: vec![TradeLine::new(CARD_X, give)],
            requested_cards: if want > 0 { vec![TradeLine::new(CARD_Y, want)] } else { Vec::new() },
            message: None,
        }
    }
}

pub fn counter(escrow: Vec<TradeLine>, requested: Vec<TradeLine>) -> CounterOffer {
    CounterOffer {
        escrow_cards: escrow,
        requested_cards: requested,
        message: None,
    }
}
