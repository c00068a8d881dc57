use crate::error::EngineError;
use crate::locks::KeyedLocks;
use chrono::Utc;
use core_types::{HistoryEntry, TradeAction, TradeId, UserId};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use store::HistoryStore;
use uuid::Uuid;

/// Append-only, per-chain log of every action taken on a negotiation.
///
/// Sequence numbers are allocated as `max + 1` under an exclusive lock on the
/// chain's root id. The store's unique `(root_trade_id, sequence_number)`
/// constraint catches writers in other processes; a collision re-reads the
/// maximum and tries the next number.
#[derive(Clone)]
pub struct NegotiationHistory {
    store: Arc<dyn HistoryStore>,
    locks: Arc<KeyedLocks<TradeId>>,
    max_retries: u32,
}

impl NegotiationHistory {
    pub fn new(store: Arc<dyn HistoryStore>, max_retries: u32) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
            max_retries: max_retries.max(1),
        }
    }

    pub async fn record(
        &self,
        trade_id: TradeId,
        root_trade_id: TradeId,
        actor: &str,
        action: TradeAction,
        details: JsonValue,
    ) -> Result<HistoryEntry, EngineError> {
        let _chain = self.locks.lock(&root_trade_id).await;
        let mut entry = HistoryEntry {
            history_id: Uuid::new_v4(),
            trade_id,
            root_trade_id,
            sequence_number: 0,
            actor_user_id: UserId::from(actor),
            action,
            details,
            created_at: Utc::now(),
        };
        for attempt in 1..=self.max_retries {
            entry.sequence_number = self.store.max_sequence(root_trade_id).await?.unwrap_or(0) + 1;
            if self.store.insert_entry(&entry).await? {
                tracing::debug!(
                    %trade_id,
                    %root_trade_id,
                    actor,
                    action = action.as_str(),
                    sequence_number = entry.sequence_number,
                    "History entry recorded."
                );
                return Ok(entry);
            }
            tracing::warn!(
                %root_trade_id,
                sequence_number = entry.sequence_number,
                attempt,
                "History sequence number already taken, retrying."
            );
        }
        Err(EngineError::Conflict(format!(
            "could not allocate a history sequence number for chain {root_trade_id}"
        )))
    }

    /// Every entry of the chain, in sequence order.
    pub async fn entries(&self, root_trade_id: TradeId) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self.store.list_entries(root_trade_id).await?)
    }
}
