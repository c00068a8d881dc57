use crate::error::EngineError;
use crate::locks::KeyedLocks;
use core_types::{Counts, Holding, HoldingKey};
use std::sync::Arc;
use store::HoldingStore;
use tokio::sync::OwnedMutexGuard;

/// What a planner wants done with a holding row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Set(Counts),
    Delete,
    Create(Holding),
    Keep,
}

/// Serialised, compare-and-swap writes to holding rows.
///
/// Each write holds the in-process lock for the row's key and then commits with
/// a CAS against the snapshot it planned from, so writers in another process
/// are caught too. A lost CAS re-reads and re-plans, up to `max_retries` times.
#[derive(Clone)]
pub struct HoldingLedger {
    store: Arc<dyn HoldingStore>,
    locks: Arc<KeyedLocks<HoldingKey>>,
    max_retries: u32,
}

impl HoldingLedger {
    pub fn new(store: Arc<dyn HoldingStore>, max_retries: u32) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
            max_retries: max_retries.max(1),
        }
    }

    pub async fn read(&self, key: &HoldingKey) -> Result<Option<Holding>, EngineError> {
        Ok(self.store.get(key).await?)
    }

    /// Takes the row locks for several keys at once, in a deadlock-free order.
    pub async fn lock_rows(&self, keys: &[HoldingKey]) -> Vec<OwnedMutexGuard<()>> {
        self.locks.lock_many(keys).await
    }

    /// Locks the row and applies `plan`. Returns the snapshot the committed
    /// change was planned from.
    pub async fn apply<F>(&self, key: &HoldingKey, plan: F) -> Result<Option<Holding>, EngineError>
    where
        F: FnMut(Option<&Holding>) -> Result<Change, EngineError>,
    {
        let _guard = self.locks.lock(key).await;
        self.apply_locked(key, plan).await
    }

    /// Like [`HoldingLedger::apply`] for a caller that already holds the row lock.
    pub async fn apply_locked<F>(
        &self,
        key: &HoldingKey,
        mut plan: F,
    ) -> Result<Option<Holding>, EngineError>
    where
        F: FnMut(Option<&Holding>) -> Result<Change, EngineError>,
    {
        for attempt in 1..=self.max_retries {
            let current = self.store.get(key).await?;
            let committed = match (plan(current.as_ref())?, current.as_ref()) {
                (Change::Keep, _) => true,
                (Change::Set(next), Some(row)) => {
                    debug_assert!(next.is_valid(), "planned counts break locked <= quantity");
                    self.store.compare_and_set(key, row.counts(), next).await?
                }
                (Change::Delete, Some(row)) => self.store.delete_if(key, row.counts()).await?,
                (Change::Create(holding), None) => self.store.insert(&holding).await?,
                // The plan was made for a row that vanished or appeared meanwhile.
                (Change::Set(_) | Change::Delete, None) | (Change::Create(_), Some(_)) => false,
            };
            if committed {
                return Ok(current);
            }
            tracing::warn!(
                inventory_id = %key.inventory_id,
                item_id = %key.item_id,
                attempt,
                "Holding write lost a compare-and-swap, retrying."
            );
        }
        Err(EngineError::Conflict(format!(
            "holding {}/{} kept changing after {} attempts",
            key.inventory_id, key.item_id, self.max_retries
        )))
    }
}
