use crate::error::EngineError;
use crate::ledger::{Change, HoldingLedger};
use crate::saga::{Compensation, Saga};
use core_types::{Counts, Holding, HoldingKey, InventoryId, TradeLine};

/// Reserves and releases holding quantity for live trades.
///
/// Invariant maintained on every row it writes: `0 <= locked_quantity <= quantity`.
#[derive(Clone)]
pub struct EscrowLockManager {
    ledger: HoldingLedger,
}

impl EscrowLockManager {
    pub fn new(ledger: HoldingLedger) -> Self {
        Self { ledger }
    }

    /// Checks that `qty` could be locked right now, without locking it.
    pub async fn check(
        &self,
        key: &HoldingKey,
        qty: u32,
        require_tradeable: bool,
    ) -> Result<(), EngineError> {
        let current = self.ledger.read(key).await?;
        ensure_lockable(key, current.as_ref(), qty, require_tradeable)
    }

    /// Checks every line of one inventory. Stops at the first failure.
    pub async fn check_lines(
        &self,
        inventory_id: InventoryId,
        lines: &[TradeLine],
        require_tradeable: bool,
    ) -> Result<(), EngineError> {
        for line in lines {
            let key = HoldingKey::new(inventory_id, line.item_id.clone());
            self.check(&key, line.quantity, require_tradeable).await?;
        }
        Ok(())
    }

    /// Reserves `qty` of the holding. Fails without writing if less than `qty`
    /// is available, or if the row must be tradeable and is not.
    pub async fn lock(
        &self,
        key: &HoldingKey,
        qty: u32,
        require_tradeable: bool,
    ) -> Result<Holding, EngineError> {
        let before = self
            .ledger
            .apply(key, |current| {
                ensure_lockable(key, current, qty, require_tradeable)?;
                // ensure_lockable rejects a missing row.
                let row = current.map(Holding::counts).unwrap_or_default();
                Ok(Change::Set(Counts::new(row.quantity, row.locked_quantity + qty)))
            })
            .await?;
        let before = before.ok_or_else(|| missing(key))?;
        tracing::debug!(
            inventory_id = %key.inventory_id,
            item_id = %key.item_id,
            qty,
            locked = before.locked_quantity + qty,
            "Escrow locked."
        );
        Ok(before.with_counts(Counts::new(before.quantity, before.locked_quantity + qty)))
    }

    /// Releases up to `qty`. The lock never drops below zero, so a repeated or
    /// oversized release is harmless. Returns how much was actually released.
    pub async fn unlock(&self, key: &HoldingKey, qty: u32) -> Result<u32, EngineError> {
        let before = self
            .ledger
            .apply(key, |current| match current {
                None => Ok(Change::Keep),
                Some(row) => Ok(Change::Set(Counts::new(
                    row.quantity,
                    row.locked_quantity.saturating_sub(qty),
                ))),
            })
            .await?;

        let Some(before) = before else {
            tracing::warn!(
                inventory_id = %key.inventory_id,
                item_id = %key.item_id,
                qty,
                "Unlock requested for a holding that no longer exists."
            );
            return Ok(0);
        };
        let released = before.locked_quantity.min(qty);
        if released < qty {
            tracing::warn!(
                inventory_id = %key.inventory_id,
                item_id = %key.item_id,
                qty,
                released,
                "Unlock clamped at zero."
            );
        }
        Ok(released)
    }

    /// Puts back a lock that a failed operation had released. Unlike
    /// [`EscrowLockManager::lock`] this never fails on availability; it caps
    /// the lock at the row's quantity instead.
    pub async fn restore(&self, key: &HoldingKey, qty: u32) -> Result<(), EngineError> {
        self.ledger
            .apply(key, |current| match current {
                None => Ok(Change::Keep),
                Some(row) => Ok(Change::Set(Counts::new(
                    row.quantity,
                    row.locked_quantity.saturating_add(qty).min(row.quantity),
                ))),
            })
            .await?;
        Ok(())
    }

    /// Locks every line in `inventory_id`, registering an unlock for each one
    /// so a later failure can give them back.
    pub async fn lock_lines(
        &self,
        inventory_id: InventoryId,
        lines: &[TradeLine],
        require_tradeable: bool,
        saga: &mut Saga,
    ) -> Result<(), EngineError> {
        for line in lines {
            let key = HoldingKey::new(inventory_id, line.item_id.clone());
            self.lock(&key, line.quantity, require_tradeable).await?;
            saga.push(Compensation::Unlock {
                key,
                qty: line.quantity,
            });
        }
        Ok(())
    }

    /// Releases every line in `inventory_id`, registering a restore for what
    /// was released.
    pub async fn unlock_lines(
        &self,
        inventory_id: InventoryId,
        lines: &[TradeLine],
        saga: &mut Saga,
    ) -> Result<(), EngineError> {
        for line in lines {
            let key = HoldingKey::new(inventory_id, line.item_id.clone());
            let released = self.unlock(&key, line.quantity).await?;
            if released > 0 {
                saga.push(Compensation::Relock { key, qty: released });
            }
        }
        Ok(())
    }
}

fn missing(key: &HoldingKey) -> EngineError {
    EngineError::InsufficientAvailable {
        inventory_id: key.inventory_id,
        item_id: key.item_id.clone(),
        requested: 0,
        available: 0,
    }
}

fn ensure_lockable(
    key: &HoldingKey,
    current: Option<&Holding>,
    qty: u32,
    require_tradeable: bool,
) -> Result<(), EngineError> {
    let insufficient = |available| EngineError::InsufficientAvailable {
        inventory_id: key.inventory_id,
        item_id: key.item_id.clone(),
        requested: qty,
        available,
    };
    let row = current.ok_or_else(|| insufficient(0))?;
    if require_tradeable && !row.tradeable {
        return Err(EngineError::NotTradeable {
            inventory_id: key.inventory_id,
            item_id: key.item_id.clone(),
        });
    }
    if row.available() < qty {
        return Err(insufficient(row.available()));
    }
    Ok(())
}
