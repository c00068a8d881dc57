use crate::error::StoreError;
use crate::traits::{Directory, HistoryStore, HoldingStore, LineCounts, TradeStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    Counts, HistoryEntry, Holding, HoldingKey, InventoryId, ItemDetails, TradeId, TradeLines,
    TradeRecord, UserId,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

/// Which write path an injected fault targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    HoldingWrite,
    TradeInsert,
    TradeUpdate,
    HistoryInsert,
}

#[derive(Debug, Default)]
struct Tables {
    holdings: BTreeMap<HoldingKey, Holding>,
    trades: HashMap<TradeId, TradeRecord>,
    lines: HashMap<TradeId, TradeLines>,
    history: Vec<HistoryEntry>,
    owners: HashMap<InventoryId, UserId>,
    users: HashMap<UserId, String>,
    items: HashMap<String, ItemDetails>,
    /// Remaining successful calls before the fault point fails once.
    faults: HashMap<FaultPoint, u32>,
}

impl Tables {
    fn trip(&mut self, point: FaultPoint) -> Result<(), StoreError> {
        let Some(remaining) = self.faults.get_mut(&point) else {
            return Ok(());
        };
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(());
        }
        self.faults.remove(&point);
        Err(StoreError::Backend(format!("injected failure at {point:?}")))
    }
}

/// A complete in-process backend. Every method takes the table lock for its
/// whole body, so each call is atomic on its own, which is exactly the
/// single-row guarantee the engine is written against.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: &str, name: &str) {
        let mut tables = self.tables.lock().await;
        tables.users.insert(user_id.to_string(), name.to_string());
    }

    pub async fn add_inventory(&self, inventory_id: InventoryId, owner: &str) {
        let mut tables = self.tables.lock().await;
        tables.owners.insert(inventory_id, owner.to_string());
    }

    pub async fn add_item(&self, details: ItemDetails) {
        let mut tables = self.tables.lock().await;
        tables.items.insert(details.item_id.clone(), details);
    }

    /// Inserts or overwrites a holding row unconditionally.
    pub async fn put_holding(&self, holding: Holding) {
        let mut tables = self.tables.lock().await;
        tables.holdings.insert(holding.key(), holding);
    }

    pub async fn holding(&self, key: &HoldingKey) -> Option<Holding> {
        self.tables.lock().await.holdings.get(key).cloned()
    }

    pub async fn holdings(&self) -> Vec<Holding> {
        self.tables.lock().await.holdings.values().cloned().collect()
    }

    pub async fn trade_count(&self) -> usize {
        self.tables.lock().await.trades.len()
    }

    /// Moves a trade's resolution time, e.g. to age it past a retention cutoff.
    pub async fn set_resolved_at(&self, trade_id: TradeId, at: DateTime<Utc>) {
        let mut tables = self.tables.lock().await;
        if let Some(trade) = tables.trades.get_mut(&trade_id) {
            trade.resolved_at = Some(at);
        }
    }

    /// Makes the call at `point` fail once, after `successes` calls went through.
    pub async fn fail_after(&self, point: FaultPoint, successes: u32) {
        let mut tables = self.tables.lock().await;
        tables.faults.insert(point, successes);
    }
}

#[async_trait]
impl HoldingStore for MemoryStore {
    async fn get(&self, key: &HoldingKey) -> Result<Option<Holding>, StoreError> {
        Ok(self.tables.lock().await.holdings.get(key).cloned())
    }

    async fn insert(&self, holding: &Holding) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.trip(FaultPoint::HoldingWrite)?;
        let key = holding.key();
        if tables.holdings.contains_key(&key) {
            return Ok(false);
        }
        tables.holdings.insert(key, holding.clone());
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &HoldingKey,
        expected: Counts,
        next: Counts,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.trip(FaultPoint::HoldingWrite)?;
        match tables.holdings.get_mut(key) {
            Some(row) if row.counts() == expected => {
                row.quantity = next.quantity;
                row.locked_quantity = next.locked_quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if(&self, key: &HoldingKey, expected: Counts) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.trip(FaultPoint::HoldingWrite)?;
        match tables.holdings.get(key) {
            Some(row) if row.counts() == expected => {
                tables.holdings.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn insert_trade(&self, record: &TradeRecord, lines: &TradeLines) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.trip(FaultPoint::TradeInsert)?;
        if tables.trades.contains_key(&record.trade_id) {
            return Err(StoreError::Duplicate(format!("trade {}", record.trade_id)));
        }
        tables.trades.insert(record.trade_id, record.clone());
        tables.lines.insert(record.trade_id, lines.clone());
        Ok(())
    }

    async fn get_trade(&self, trade_id: TradeId) -> Result<Option<TradeRecord>, StoreError> {
        Ok(self.tables.lock().await.trades.get(&trade_id).cloned())
    }

    async fn get_lines(&self, trade_id: TradeId) -> Result<TradeLines, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .lines
            .get(&trade_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_trade(&self, expected_version: i64, record: &TradeRecord) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.trip(FaultPoint::TradeUpdate)?;
        match tables.trades.get_mut(&record.trade_id) {
            Some(row) if row.version == expected_version => {
                *row = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_trade(&self, trade_id: TradeId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.trades.remove(&trade_id);
        tables.lines.remove(&trade_id);
        Ok(())
    }

    async fn chain(&self, root_trade_id: TradeId) -> Result<Vec<TradeRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut chain: Vec<TradeRecord> = tables
            .trades
            .values()
            .filter(|t| t.root_trade_id == root_trade_id)
            .cloned()
            .collect();
        chain.sort_by_key(|t| t.counter_count);
        Ok(chain)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TradeRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut trades: Vec<TradeRecord> = tables
            .trades
            .values()
            .filter(|t| t.initiator_user_id == user_id || t.recipient_user_id == user_id)
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trades)
    }

    async fn resolved_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TradeRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .trades
            .values()
            .filter(|t| t.resolved_at.is_some_and(|at| at < cutoff))
            .cloned()
            .collect())
    }

    async fn count_lines(&self, trade_id: TradeId) -> Result<LineCounts, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .lines
            .get(&trade_id)
            .map(|lines| LineCounts {
                escrow: lines.escrow.len() as u64,
                requested: lines.requested.len() as u64,
            })
            .unwrap_or_default())
    }

    async fn delete_lines(&self, trade_id: TradeId) -> Result<LineCounts, StoreError> {
        let mut tables = self.tables.lock().await;
        let counts = match tables.lines.get_mut(&trade_id) {
            Some(lines) => {
                let counts = LineCounts {
                    escrow: lines.escrow.len() as u64,
                    requested: lines.requested.len() as u64,
                };
                lines.escrow.clear();
                lines.requested.clear();
                counts
            }
            None => LineCounts::default(),
        };
        Ok(counts)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn max_sequence(&self, root_trade_id: TradeId) -> Result<Option<i64>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .history
            .iter()
            .filter(|e| e.root_trade_id == root_trade_id)
            .map(|e| e.sequence_number)
            .max())
    }

    async fn insert_entry(&self, entry: &HistoryEntry) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.trip(FaultPoint::HistoryInsert)?;
        let taken = tables
            .history
            .iter()
            .any(|e| e.root_trade_id == entry.root_trade_id && e.sequence_number == entry.sequence_number);
        if taken {
            return Ok(false);
        }
        tables.history.push(entry.clone());
        Ok(true)
    }

    async fn list_entries(&self, root_trade_id: TradeId) -> Result<Vec<HistoryEntry>, StoreError> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<HistoryEntry> = tables
            .history
            .iter()
            .filter(|e| e.root_trade_id == root_trade_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence_number);
        Ok(entries)
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn inventory_owner(&self, inventory_id: InventoryId) -> Result<Option<UserId>, StoreError> {
        Ok(self.tables.lock().await.owners.get(&inventory_id).cloned())
    }

    async fn user_name(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables.lock().await.users.get(user_id).cloned())
    }

    async fn item_details(&self, item_id: &str) -> Result<Option<ItemDetails>, StoreError> {
        Ok(self.tables.lock().await.items.get(item_id).cloned())
    }
}
