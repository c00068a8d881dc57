use chrono::{DateTime, Utc};
use core_types::{
    HistoryEntry, InventoryId, ItemDetails, ItemId, Party, RoleFilter, TradeId, TradeLine,
    TradeLines, TradeRecord, TradeStatus, UserId,
};
use serde::{Deserialize, Serialize};

// --- Requests ---

/// A new offer. The initiator is the acting user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTrade {
    pub initiator_inventory_id: InventoryId,
    pub recipient_user_id: UserId,
    pub recipient_inventory_id: InventoryId,
    pub escrow_cards: Vec<TradeLine>,
    #[serde(default)]
    pub requested_cards: Vec<TradeLine>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The recipient's answer to a pending offer.
#[derive(Debug, Clone, Deserialize)]
pub struct CounterOffer {
    pub escrow_cards: Vec<TradeLine>,
    #[serde(default)]
    pub requested_cards: Vec<TradeLine>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TradeFilter {
    #[serde(default)]
    pub status: Option<TradeStatus>,
    #[serde(default)]
    pub role: RoleFilter,
}

impl TradeFilter {
    pub fn matches(&self, trade: &TradeRecord, user_id: &str) -> bool {
        if self.status.is_some_and(|status| status != trade.status) {
            return false;
        }
        match self.role {
            RoleFilter::Any => true,
            RoleFilter::Initiator => trade.initiator_user_id == user_id,
            RoleFilter::Recipient => trade.recipient_user_id == user_id,
        }
    }
}

// --- Responses ---

/// A trade line with its catalog details resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineView {
    pub item_id: ItemId,
    pub quantity: u32,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub rarity: Option<String>,
    pub set_id: Option<String>,
}

impl LineView {
    pub fn new(line: &TradeLine, details: Option<ItemDetails>) -> Self {
        let (name, image_url, rarity, set_id) = match details {
            Some(d) => (Some(d.name), d.image_url, d.rarity, d.set_id),
            None => (None, None, None, None),
        };
        Self {
            item_id: line.item_id.clone(),
            quantity: line.quantity,
            name,
            image_url,
            rarity,
            set_id,
        }
    }
}

/// One offer of the chain a trade belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub trade_id: TradeId,
    pub parent_trade_id: Option<TradeId>,
    pub counter_count: u32,
    pub initiator_user_id: UserId,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&TradeRecord> for ChainLink {
    fn from(trade: &TradeRecord) -> Self {
        Self {
            trade_id: trade.trade_id,
            parent_trade_id: trade.parent_trade_id,
            counter_count: trade.counter_count,
            initiator_user_id: trade.initiator_user_id.clone(),
            status: trade.status,
            created_at: trade.created_at,
        }
    }
}

/// A trade as returned to callers: the record, its resolved lines,
/// participant names and the whole negotiation chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeView {
    #[serde(flatten)]
    pub trade: TradeRecord,
    pub escrow_cards: Vec<LineView>,
    pub requested_cards: Vec<LineView>,
    pub initiator_name: Option<String>,
    pub recipient_name: Option<String>,
    pub chain: Vec<ChainLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    #[serde(flatten)]
    pub entry: HistoryEntry,
    pub actor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeHistory {
    pub root_trade_id: TradeId,
    pub history: Vec<HistoryView>,
}

/// Per-user trade counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeSummary {
    pub user_id: UserId,
    pub total: u64,
    pub pending: u64,
    /// Accepted and waiting on confirmations.
    pub active: u64,
    pub completed: u64,
    /// Cancelled or rejected.
    pub cancelled: u64,
    /// Units given away in completed trades.
    pub cards_traded: u64,
    /// Units received in completed trades.
    pub cards_received: u64,
}

impl TradeSummary {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            total: 0,
            pending: 0,
            active: 0,
            completed: 0,
            cancelled: 0,
            cards_traded: 0,
            cards_received: 0,
        }
    }

    /// Counts one trade. `lines` is only read for completed trades.
    pub fn add(&mut self, trade: &TradeRecord, lines: Option<&TradeLines>) {
        self.total += 1;
        match trade.status {
            TradeStatus::Pending => self.pending += 1,
            TradeStatus::Accepted => self.active += 1,
            TradeStatus::Cancelled | TradeStatus::Rejected => self.cancelled += 1,
            TradeStatus::Countered => {}
            TradeStatus::Completed => {
                self.completed += 1;
                let (Some(lines), Some(party)) = (lines, trade.party_of(&self.user_id)) else {
                    return;
                };
                let sum = |lines: &[TradeLine]| lines.iter().map(|l| u64::from(l.quantity)).sum::<u64>();
                let (gave, got) = match party {
                    Party::Initiator => (&lines.escrow, &lines.requested),
                    Party::Recipient => (&lines.requested, &lines.escrow),
                };
                self.cards_traded += sum(gave);
                self.cards_received += sum(got);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn filter_by_role_and_status() {
        let trade = TradeRecord::new_offer("alice", Uuid::new_v4(), "bob", Uuid::new_v4(), None);
        let by_role = TradeFilter {
            status: None,
            role: RoleFilter::Recipient,
        };
        assert!(by_role.matches(&trade, "bob"));
        assert!(!by_role.matches(&trade, "alice"));

        let by_status = TradeFilter {
            status: Some(TradeStatus::Completed),
            role: RoleFilter::Any,
        };
        assert!(!by_status.matches(&trade, "alice"));
    }

    #[test]
    fn summary_counts_units_from_the_users_side() {
        let lines = TradeLines::new(vec![TradeLine::new("OGN-001", 3)], vec![TradeLine::new("OGN-002", 1)]);
        let mut done = TradeRecord::new_offer("alice", Uuid::new_v4(), "bob", Uuid::new_v4(), None);
        done.status = TradeStatus::Completed;
        let mut rejected = done.clone();
        rejected.status = TradeStatus::Rejected;

        let mut bob = TradeSummary::new("bob");
        bob.add(&done, Some(&lines));
        bob.add(&rejected, Some(&lines));
        assert_eq!((bob.total, bob.completed, bob.cancelled), (2, 1, 1));
        assert_eq!((bob.cards_traded, bob.cards_received), (1, 3));
    }

    #[test]
    fn trade_view_flattens_the_record() {
        let trade = TradeRecord::new_offer("alice", Uuid::new_v4(), "bob", Uuid::new_v4(), None);
        let view = TradeView {
            chain: vec![ChainLink::from(&trade)],
            trade,
            escrow_cards: vec![LineView::new(&TradeLine::new("OGN-001", 1), None)],
            requested_cards: Vec::new(),
            initiator_name: Some("Alice".into()),
            recipient_name: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["escrow_cards"][0]["quantity"], 1);
        assert_eq!(json["chain"].as_array().map(Vec::len), Some(1));
    }
}
