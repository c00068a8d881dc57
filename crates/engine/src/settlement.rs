use crate::error::EngineError;
use crate::ledger::{Change, HoldingLedger};
use crate::saga::{Compensation, Saga};
use core_types::{Counts, Holding, HoldingKey, InventoryId, ItemId, TradeLine, TradeLines, TradeRecord};
use serde::Serialize;

/// One item movement between two inventories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub item_id: ItemId,
    pub quantity: u32,
    pub from: InventoryId,
    pub to: InventoryId,
    /// Tradeable flag of the source row, used if it must be recreated on reversal.
    #[serde(skip)]
    pub source_tradeable: bool,
}

impl Transfer {
    fn source(&self) -> HoldingKey {
        HoldingKey::new(self.from, self.item_id.clone())
    }

    fn destination(&self) -> HoldingKey {
        HoldingKey::new(self.to, self.item_id.clone())
    }
}

/// Moves escrowed and requested items once both sides have agreed.
#[derive(Clone)]
pub struct SettlementExecutor {
    ledger: HoldingLedger,
}

impl SettlementExecutor {
    pub fn new(ledger: HoldingLedger) -> Self {
        Self { ledger }
    }

    /// Transfers every escrow line initiator → recipient, then every requested
    /// line recipient → initiator. Each completed transfer registers its
    /// reversal on `saga`.
    pub async fn execute(
        &self,
        trade: &TradeRecord,
        lines: &TradeLines,
        saga: &mut Saga,
    ) -> Result<Vec<Transfer>, EngineError> {
        let mut done = Vec::with_capacity(lines.escrow.len() + lines.requested.len());
        let legs = [
            (&lines.escrow, trade.initiator_inventory_id, trade.recipient_inventory_id),
            (&lines.requested, trade.recipient_inventory_id, trade.initiator_inventory_id),
        ];
        for (leg, from, to) in legs {
            for line in leg.iter() {
                let transfer = self.transfer(line, from, to).await?;
                saga.push(Compensation::ReverseTransfer(transfer.clone()));
                done.push(transfer);
            }
        }
        tracing::info!(
            trade_id = %trade.trade_id,
            transfers = done.len(),
            "Settlement transfers applied."
        );
        Ok(done)
    }

    /// Moves one line's locked quantity out of `from` into `to`. The source
    /// row is deleted when it reaches zero; the destination row is created if
    /// missing. Either both rows change or neither does.
    pub async fn transfer(
        &self,
        line: &TradeLine,
        from: InventoryId,
        to: InventoryId,
    ) -> Result<Transfer, EngineError> {
        let mut transfer = Transfer {
            item_id: line.item_id.clone(),
            quantity: line.quantity,
            from,
            to,
            source_tradeable: false,
        };
        let (source, destination) = (transfer.source(), transfer.destination());
        let _rows = self.ledger.lock_rows(&[source.clone(), destination.clone()]).await;

        let before = self.debit(&source, line.quantity, true).await?;
        transfer.source_tradeable = before.tradeable;

        if let Err(e) = self.credit(&destination, line.quantity, false, false).await {
            if let Err(undo) = self.credit(&source, line.quantity, true, before.tradeable).await {
                tracing::error!(
                    inventory_id = %from,
                    item_id = %line.item_id,
                    error = %undo,
                    "Failed to return debited quantity after a failed credit."
                );
            }
            return Err(e);
        }
        Ok(transfer)
    }

    /// Undoes a transfer: takes the quantity back out of the destination and
    /// returns it, still locked, to the source.
    pub async fn reverse(&self, transfer: &Transfer) -> Result<(), EngineError> {
        let (source, destination) = (transfer.source(), transfer.destination());
        let _rows = self.ledger.lock_rows(&[source.clone(), destination.clone()]).await;
        self.debit(&destination, transfer.quantity, false).await?;
        self.credit(&source, transfer.quantity, true, transfer.source_tradeable)
            .await
    }

    /// Removes `qty` from a row whose lock the caller holds. With
    /// `from_locked` the quantity must come out of the locked portion,
    /// otherwise out of the available portion.
    async fn debit(&self, key: &HoldingKey, qty: u32, from_locked: bool) -> Result<Holding, EngineError> {
        let before = self
            .ledger
            .apply_locked(key, |current| {
                let row = current.ok_or_else(|| EngineError::NotFound(format!(
                    "holding {}/{}",
                    key.inventory_id, key.item_id
                )))?;
                let covered = if from_locked { row.locked_quantity } else { row.available() };
                if covered < qty {
                    return Err(EngineError::InvalidState(format!(
                        "holding {}/{} has {} {} units, cannot move {}",
                        key.inventory_id,
                        key.item_id,
                        covered,
                        if from_locked { "locked" } else { "available" },
                        qty
                    )));
                }
                let locked = if from_locked { row.locked_quantity - qty } else { row.locked_quantity };
                let next = Counts::new(row.quantity - qty, locked);
                Ok(if next.quantity == 0 { Change::Delete } else { Change::Set(next) })
            })
            .await?;
        before.ok_or_else(|| EngineError::NotFound(format!("holding {}/{}", key.inventory_id, key.item_id)))
    }

    /// Adds `qty` to a row whose lock the caller holds, creating it if needed.
    /// With `locked` the added quantity is also reserved.
    async fn credit(&self, key: &HoldingKey, qty: u32, locked: bool, tradeable: bool) -> Result<(), EngineError> {
        let add_locked = if locked { qty } else { 0 };
        self.ledger
            .apply_locked(key, |current| {
                Ok(match current {
                    Some(row) => Change::Set(Counts::new(
                        row.quantity + qty,
                        row.locked_quantity + add_locked,
                    )),
                    None => Change::Create(Holding {
                        inventory_id: key.inventory_id,
                        item_id: key.item_id.clone(),
                        quantity: qty,
                        locked_quantity: add_locked,
                        tradeable,
                    }),
                })
            })
            .await?;
        Ok(())
    }
}
