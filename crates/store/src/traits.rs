use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    Counts, HistoryEntry, Holding, HoldingKey, InventoryId, ItemDetails, TradeId, TradeLines,
    TradeRecord, UserId,
};
use serde::{Deserialize, Serialize};

/// Per-(inventory, item) quantities. Owned by the inventory subsystem; the
/// settlement engine only ever writes through these compare-and-swap calls.
#[async_trait]
pub trait HoldingStore: Send + Sync {
    async fn get(&self, key: &HoldingKey) -> Result<Option<Holding>, StoreError>;

    /// Creates the row. Returns `false` if a row already exists for the key.
    async fn insert(&self, holding: &Holding) -> Result<bool, StoreError>;

    /// Writes `next` only if the stored pair still equals `expected`.
    /// Returns `false` on a conflict or when the row is gone.
    async fn compare_and_set(
        &self,
        key: &HoldingKey,
        expected: Counts,
        next: Counts,
    ) -> Result<bool, StoreError>;

    /// Deletes the row only if the stored pair still equals `expected`.
    async fn delete_if(&self, key: &HoldingKey, expected: Counts) -> Result<bool, StoreError>;
}

/// Number of line rows attached to a trade, per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineCounts {
    pub escrow: u64,
    pub requested: u64,
}

impl LineCounts {
    pub fn total(&self) -> u64 {
        self.escrow + self.requested
    }
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Persists a new record together with its lines.
    async fn insert_trade(&self, record: &TradeRecord, lines: &TradeLines) -> Result<(), StoreError>;

    async fn get_trade(&self, trade_id: TradeId) -> Result<Option<TradeRecord>, StoreError>;

    async fn get_lines(&self, trade_id: TradeId) -> Result<TradeLines, StoreError>;

    /// Replaces the stored record only if its version is still
    /// `expected_version`. The caller bumps `record.version` beforehand.
    async fn update_trade(&self, expected_version: i64, record: &TradeRecord) -> Result<bool, StoreError>;

    /// Removes a record and its lines. Only used to undo a failed creation.
    async fn delete_trade(&self, trade_id: TradeId) -> Result<(), StoreError>;

    /// Every record sharing `root_trade_id`, ordered by `counter_count`.
    async fn chain(&self, root_trade_id: TradeId) -> Result<Vec<TradeRecord>, StoreError>;

    /// Records where the user is initiator or recipient, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TradeRecord>, StoreError>;

    /// Records resolved strictly before `cutoff`.
    async fn resolved_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TradeRecord>, StoreError>;

    async fn count_lines(&self, trade_id: TradeId) -> Result<LineCounts, StoreError>;

    /// Deletes every line of the trade and reports how many went.
    async fn delete_lines(&self, trade_id: TradeId) -> Result<LineCounts, StoreError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn max_sequence(&self, root_trade_id: TradeId) -> Result<Option<i64>, StoreError>;

    /// Appends the entry. Returns `false` if its sequence number is already
    /// taken for the chain.
    async fn insert_entry(&self, entry: &HistoryEntry) -> Result<bool, StoreError>;

    /// The whole chain's log, ordered by sequence number.
    async fn list_entries(&self, root_trade_id: TradeId) -> Result<Vec<HistoryEntry>, StoreError>;
}

/// Lookups owned by other subsystems. Only `inventory_owner` affects
/// correctness; the rest enrich responses.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn inventory_owner(&self, inventory_id: InventoryId) -> Result<Option<UserId>, StoreError>;

    async fn user_name(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    async fn item_details(&self, item_id: &str) -> Result<Option<ItemDetails>, StoreError>;
}

/// Everything the settlement engine needs from persistence.
pub trait Backend: HoldingStore + TradeStore + HistoryStore + Directory {}

impl<T> Backend for T where T: HoldingStore + TradeStore + HistoryStore + Directory {}
