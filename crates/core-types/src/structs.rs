use crate::enums::{LineKind, Party, TradeAction, TradeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub type UserId = String;
pub type ItemId = String;
pub type InventoryId = Uuid;
pub type TradeId = Uuid;

/// Identifies one holding row: a single item inside a single inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HoldingKey {
    pub inventory_id: InventoryId,
    pub item_id: ItemId,
}

impl HoldingKey {
    pub fn new(inventory_id: InventoryId, item_id: impl Into<ItemId>) -> Self {
        Self {
            inventory_id,
            item_id: item_id.into(),
        }
    }
}

/// The mutable pair of a holding. Every write to a holding is a compare-and-swap
/// on this pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counts {
    pub quantity: u32,
    pub locked_quantity: u32,
}

impl Counts {
    pub fn new(quantity: u32, locked_quantity: u32) -> Self {
        Self {
            quantity,
            locked_quantity,
        }
    }

    /// `0 <= locked_quantity <= quantity`.
    pub fn is_valid(&self) -> bool {
        self.locked_quantity <= self.quantity
    }

    pub fn available(&self) -> u32 {
        self.quantity.saturating_sub(self.locked_quantity)
    }
}

/// A quantity of one item held in one inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub inventory_id: InventoryId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub locked_quantity: u32,
    pub tradeable: bool,
}

impl Holding {
    pub fn new(inventory_id: InventoryId, item_id: impl Into<ItemId>, quantity: u32, tradeable: bool) -> Self {
        Self {
            inventory_id,
            item_id: item_id.into(),
            quantity,
            locked_quantity: 0,
            tradeable,
        }
    }

    pub fn key(&self) -> HoldingKey {
        HoldingKey::new(self.inventory_id, self.item_id.clone())
    }

    pub fn counts(&self) -> Counts {
        Counts::new(self.quantity, self.locked_quantity)
    }

    pub fn with_counts(&self, counts: Counts) -> Self {
        Self {
            quantity: counts.quantity,
            locked_quantity: counts.locked_quantity,
            ..self.clone()
        }
    }

    /// Quantity not reserved by any live trade.
    pub fn available(&self) -> u32 {
        self.counts().available()
    }
}

/// One `(item, quantity)` line of a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLine {
    pub item_id: ItemId,
    pub quantity: u32,
}

impl TradeLine {
    pub fn new(item_id: impl Into<ItemId>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Both line collections of a trade, in the order they were submitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeLines {
    pub escrow: Vec<TradeLine>,
    pub requested: Vec<TradeLine>,
}

impl TradeLines {
    pub fn new(escrow: Vec<TradeLine>, requested: Vec<TradeLine>) -> Self {
        Self { escrow, requested }
    }

    pub fn get(&self, kind: LineKind) -> &[TradeLine] {
        match kind {
            LineKind::Escrow => &self.escrow,
            LineKind::Requested => &self.requested,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.escrow.is_empty() && self.requested.is_empty()
    }
}

/// A single offer in a negotiation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: TradeId,
    pub root_trade_id: TradeId,
    pub parent_trade_id: Option<TradeId>,
    pub counter_count: u32,
    pub initiator_user_id: UserId,
    pub initiator_inventory_id: InventoryId,
    pub recipient_user_id: UserId,
    pub recipient_inventory_id: InventoryId,
    pub status: TradeStatus,
    pub initiator_confirmed: bool,
    pub initiator_confirmed_at: Option<DateTime<Utc>>,
    pub recipient_confirmed: bool,
    pub recipient_confirmed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message: Option<String>,
    pub cancel_reason: Option<String>,
    /// Optimistic concurrency token, bumped by every stored update.
    pub version: i64,
}

impl TradeRecord {
    /// Creates the first offer of a new chain. Its `root_trade_id` is its own id.
    pub fn new_offer(
        initiator_user_id: impl Into<UserId>,
        initiator_inventory_id: InventoryId,
        recipient_user_id: impl Into<UserId>,
        recipient_inventory_id: InventoryId,
        message: Option<String>,
    ) -> Self {
        let trade_id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            trade_id,
            root_trade_id: trade_id,
            parent_trade_id: None,
            counter_count: 0,
            initiator_user_id: initiator_user_id.into(),
            initiator_inventory_id,
            recipient_user_id: recipient_user_id.into(),
            recipient_inventory_id,
            status: TradeStatus::Pending,
            initiator_confirmed: false,
            initiator_confirmed_at: None,
            recipient_confirmed: false,
            recipient_confirmed_at: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
            message,
            cancel_reason: None,
            version: 0,
        }
    }

    /// A transfer between two inventories of the same user.
    pub fn is_self_transfer(&self) -> bool {
        self.initiator_user_id == self.recipient_user_id
    }

    /// The role `user_id` plays in this trade, if any. For a self-transfer the
    /// user is reported as the initiator.
    pub fn party_of(&self, user_id: &str) -> Option<Party> {
        if self.initiator_user_id == user_id {
            Some(Party::Initiator)
        } else if self.recipient_user_id == user_id {
            Some(Party::Recipient)
        } else {
            None
        }
    }

    pub fn user_of(&self, party: Party) -> &str {
        match party {
            Party::Initiator => &self.initiator_user_id,
            Party::Recipient => &self.recipient_user_id,
        }
    }

    pub fn inventory_of(&self, party: Party) -> InventoryId {
        match party {
            Party::Initiator => self.initiator_inventory_id,
            Party::Recipient => self.recipient_inventory_id,
        }
    }

    pub fn is_confirmed_by(&self, party: Party) -> bool {
        match party {
            Party::Initiator => self.initiator_confirmed,
            Party::Recipient => self.recipient_confirmed,
        }
    }

    pub fn set_confirmed(&mut self, party: Party, at: Option<DateTime<Utc>>) {
        match party {
            Party::Initiator => {
                self.initiator_confirmed = at.is_some();
                self.initiator_confirmed_at = at;
            }
            Party::Recipient => {
                self.recipient_confirmed = at.is_some();
                self.recipient_confirmed_at = at;
            }
        }
    }

    pub fn both_confirmed(&self) -> bool {
        self.initiator_confirmed && self.recipient_confirmed
    }
}

/// An append-only record of one action in a negotiation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub history_id: Uuid,
    pub trade_id: TradeId,
    pub root_trade_id: TradeId,
    pub sequence_number: i64,
    pub actor_user_id: UserId,
    pub action: TradeAction,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Catalog information used to enrich trade views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub item_id: ItemId,
    pub name: String,
    pub image_url: Option<String>,
    pub rarity: Option<String>,
    pub set_id: Option<String>,
}
