use crate::error::EngineError;
use chrono::{DateTime, Utc};
use core_types::{TradeId, TradeRecord, TradeStatus};
use uuid::Uuid;

/// Builds the next offer of a negotiation chain.
pub struct CounterOfferChain;

impl CounterOfferChain {
    /// The pending record that answers `parent`. Roles are swapped, so the
    /// parent's recipient becomes the new initiator and offers from the
    /// recipient's inventory. Chain identity (`root_trade_id`) is carried over.
    pub fn derive(parent: &TradeRecord, message: Option<String>, now: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            trade_id: Uuid::new_v4(),
            root_trade_id: parent.root_trade_id,
            parent_trade_id: Some(parent.trade_id),
            counter_count: parent.counter_count + 1,
            initiator_user_id: parent.recipient_user_id.clone(),
            initiator_inventory_id: parent.recipient_inventory_id,
            recipient_user_id: parent.initiator_user_id.clone(),
            recipient_inventory_id: parent.initiator_inventory_id,
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

    /// The single live record of a chain, if there is one. More than one live
    /// record means the chain is corrupt.
    pub fn live(root_trade_id: TradeId, chain: &[TradeRecord]) -> Result<Option<&TradeRecord>, EngineError> {
        let mut live = chain.iter().filter(|t| !t.status.is_terminal());
        let first = live.next();
        if live.next().is_some() {
            return Err(EngineError::InvalidState(format!(
                "chain {root_trade_id} has more than one open offer"
            )));
        }
        Ok(first)
    }
}
