use crate::escrow::EscrowLockManager;
use crate::settlement::{SettlementExecutor, Transfer};
use core_types::{HoldingKey, TradeId, TradeRecord};
use store::TradeStore;

/// The inverse of one step that has already been written.
#[derive(Debug, Clone)]
pub enum Compensation {
    /// Undo a lock.
    Unlock { key: HoldingKey, qty: u32 },
    /// Undo an unlock.
    Relock { key: HoldingKey, qty: u32 },
    /// Undo a trade insert.
    DeleteTrade(TradeId),
    /// Undo a trade update: put `previous` back over the stored version
    /// `current_version`.
    RestoreTrade {
        previous: Box<TradeRecord>,
        current_version: i64,
    },
    /// Undo a settlement transfer.
    ReverseTransfer(Transfer),
}

/// The collaborators compensations are replayed against.
pub struct Compensator<'a> {
    pub escrow: &'a EscrowLockManager,
    pub settlement: &'a SettlementExecutor,
    pub trades: &'a dyn TradeStore,
}

/// A log of applied steps for one multi-row operation.
///
/// The store only guarantees single-row atomicity, so an operation that writes
/// several rows registers the inverse of each write as it goes. If a later step
/// fails, [`Saga::unwind`] replays the inverses newest-first.
#[derive(Debug)]
pub struct Saga {
    operation: &'static str,
    steps: Vec<Compensation>,
}

impl Saga {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Forgets the log once the operation has fully succeeded.
    pub fn commit(self) {
        tracing::trace!(operation = self.operation, steps = self.steps.len(), "Saga committed.");
    }

    /// Replays every registered inverse, newest first. A compensation that
    /// itself fails is logged and skipped; the rest still run.
    pub async fn unwind(self, with: &Compensator<'_>) {
        if self.steps.is_empty() {
            return;
        }
        tracing::warn!(
            operation = self.operation,
            steps = self.steps.len(),
            "Operation failed part-way, compensating applied steps."
        );
        for step in self.steps.into_iter().rev() {
            let outcome = match &step {
                Compensation::Unlock { key, qty } => with.escrow.unlock(key, *qty).await.map(|_| ()),
                Compensation::Relock { key, qty } => with.escrow.restore(key, *qty).await,
                Compensation::DeleteTrade(trade_id) => with
                    .trades
                    .delete_trade(*trade_id)
                    .await
                    .map_err(Into::into),
                Compensation::RestoreTrade {
                    previous,
                    current_version,
                } => {
                    let mut restored = (**previous).clone();
                    restored.version = current_version + 1;
                    match with.trades.update_trade(*current_version, &restored).await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(crate::EngineError::Conflict(format!(
                            "trade {} changed before it could be restored",
                            previous.trade_id
                        ))),
                        Err(e) => Err(e.into()),
                    }
                }
                Compensation::ReverseTransfer(transfer) => with.settlement.reverse(transfer).await,
            };
            if let Err(e) = outcome {
                tracing::error!(
                    operation = self.operation,
                    step = ?step,
                    error = %e,
                    "Compensation failed; manual repair may be needed."
                );
            }
        }
    }
}
