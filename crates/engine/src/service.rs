use crate::counter::CounterOfferChain;
use crate::error::EngineError;
use crate::escrow::EscrowLockManager;
use crate::history::NegotiationHistory;
use crate::ledger::HoldingLedger;
use crate::locks::KeyedLocks;
use crate::retention::{CleanupReport, RetentionCleanup};
use crate::saga::{Compensation, Compensator, Saga};
use crate::settlement::SettlementExecutor;
use crate::state_machine::{TradeStateMachine, Transition};
use crate::view::{
    ChainLink, CounterOffer, CreateTrade, HistoryView, LineView, TradeFilter, TradeHistory,
    TradeSummary, TradeView,
};
use chrono::Utc;
use core_types::validation::{
    validate_lines, validate_text, MAX_CANCEL_REASON_LEN, MAX_MESSAGE_LEN,
};
use core_types::{
    InventoryId, LineKind, Party, TradeAction, TradeId, TradeLine, TradeLines, TradeRecord,
    TradeStatus,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use store::{Backend, Directory, HistoryStore, HoldingStore, TradeStore};
use tokio::sync::OwnedMutexGuard;

/// Engine tuning taken from the application configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub max_cas_retries: u32,
    pub default_retention_days: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&configuration::Config::default())
    }
}

impl From<&configuration::Config> for EngineOptions {
    fn from(config: &configuration::Config) -> Self {
        Self {
            max_cas_retries: config.settlement.max_cas_retries,
            default_retention_days: config.retention.default_days,
        }
    }
}

/// The action surface of the settlement engine.
///
/// Every action on an existing trade runs under an exclusive lock on its
/// chain's root id, re-reads the trade once the lock is held, and applies its
/// writes as a [`Saga`]. The trade's new status is always claimed first, so a
/// competing writer in another process sees the version bump and backs off
/// before any lock is released or any item moves.
pub struct TradeService {
    trades: Arc<dyn TradeStore>,
    directory: Arc<dyn Directory>,
    escrow: EscrowLockManager,
    settlement: SettlementExecutor,
    history: NegotiationHistory,
    retention: RetentionCleanup,
    chains: KeyedLocks<TradeId>,
    options: EngineOptions,
}

impl TradeService {
    pub fn new<B: Backend + 'static>(backend: Arc<B>, options: EngineOptions) -> Self {
        let holdings: Arc<dyn HoldingStore> = backend.clone();
        let history: Arc<dyn HistoryStore> = backend.clone();
        let trades: Arc<dyn TradeStore> = backend.clone();
        let ledger = HoldingLedger::new(holdings, options.max_cas_retries);
        Self {
            escrow: EscrowLockManager::new(ledger.clone()),
            settlement: SettlementExecutor::new(ledger),
            history: NegotiationHistory::new(history, options.max_cas_retries),
            retention: RetentionCleanup::new(trades.clone()),
            trades,
            directory: backend,
            chains: KeyedLocks::new(),
            options,
        }
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    // --- Actions ---

    /// Opens a new negotiation chain, or performs a self-transfer outright
    /// when both inventories belong to the acting user.
    pub async fn create_trade(&self, actor: &str, request: CreateTrade) -> Result<TradeView, EngineError> {
        validate_lines("escrow_cards", &request.escrow_cards, true)?;
        validate_lines("requested_cards", &request.requested_cards, false)?;
        validate_text("message", request.message.as_deref(), MAX_MESSAGE_LEN)?;
        if request.initiator_inventory_id == request.recipient_inventory_id {
            return Err(EngineError::Validation(
                "initiator and recipient inventories must differ".to_string(),
            ));
        }
        self.ensure_owner(request.initiator_inventory_id, actor).await?;
        self.ensure_owner(request.recipient_inventory_id, &request.recipient_user_id)
            .await?;

        let lines = TradeLines::new(request.escrow_cards, request.requested_cards);
        let record = TradeRecord::new_offer(
            actor,
            request.initiator_inventory_id,
            request.recipient_user_id,
            request.recipient_inventory_id,
            request.message,
        );
        let self_transfer = record.is_self_transfer();
        self.escrow
            .check_lines(record.initiator_inventory_id, &lines.escrow, !self_transfer)
            .await?;
        self.escrow
            .check_lines(record.recipient_inventory_id, &lines.requested, !self_transfer)
            .await?;

        let mut saga = Saga::new("create_trade");
        let result = if self_transfer {
            self.self_transfer_steps(&record, &lines, &mut saga).await
        } else {
            self.create_steps(&record, &lines, &mut saga).await
        };
        let stored = self.finish(saga, result).await?;
        tracing::info!(
            trade_id = %stored.trade_id,
            actor,
            status = %stored.status,
            escrow_lines = lines.escrow.len(),
            requested_lines = lines.requested.len(),
            "Trade created."
        );
        self.view(stored).await
    }

    pub async fn accept_trade(&self, trade_id: TradeId, actor: &str) -> Result<TradeView, EngineError> {
        let (_chain, trade) = self.lock_chain(trade_id).await?;
        let outcome = TradeStateMachine::transition(&trade, Transition::Accept, actor, Utc::now())?;
        let lines = self.trades.get_lines(trade_id).await?;

        let mut saga = Saga::new("accept_trade");
        let result = async {
            self.claim(&trade, &outcome.next, &mut saga).await?;
            self.escrow
                .lock_lines(
                    trade.recipient_inventory_id,
                    &lines.requested,
                    !trade.is_self_transfer(),
                    &mut saga,
                )
                .await?;
            self.history
                .record(
                    trade_id,
                    trade.root_trade_id,
                    actor,
                    TradeAction::Accepted,
                    json!({ "locked_requested": lines.requested }),
                )
                .await?;
            Ok::<_, EngineError>(outcome.next)
        }
        .await;
        let stored = self.finish(saga, result).await?;
        tracing::info!(%trade_id, actor, "Trade accepted.");
        self.view(stored).await
    }

    pub async fn reject_trade(&self, trade_id: TradeId, actor: &str) -> Result<TradeView, EngineError> {
        let stored = self
            .close(trade_id, actor, Transition::Reject, TradeAction::Rejected, None)
            .await?;
        tracing::info!(%trade_id, actor, "Trade rejected.");
        self.view(stored).await
    }

    pub async fn cancel_trade(
        &self,
        trade_id: TradeId,
        actor: &str,
        reason: Option<String>,
    ) -> Result<TradeView, EngineError> {
        validate_text("reason", reason.as_deref(), MAX_CANCEL_REASON_LEN)?;
        let stored = self
            .close(trade_id, actor, Transition::Cancel, TradeAction::Cancelled, reason)
            .await?;
        tracing::info!(%trade_id, actor, reason = ?stored.cancel_reason, "Trade cancelled.");
        self.view(stored).await
    }

    /// Supersedes a pending offer with a new one from its recipient. Returns
    /// the new offer.
    pub async fn counter_offer(
        &self,
        trade_id: TradeId,
        actor: &str,
        request: CounterOffer,
    ) -> Result<TradeView, EngineError> {
        validate_lines("escrow_cards", &request.escrow_cards, true)?;
        validate_lines("requested_cards", &request.requested_cards, false)?;
        validate_text("message", request.message.as_deref(), MAX_MESSAGE_LEN)?;

        let (_chain, parent) = self.lock_chain(trade_id).await?;
        let now = Utc::now();
        let outcome = TradeStateMachine::transition(&parent, Transition::Counter, actor, now)?;
        let chain = self.trades.chain(parent.root_trade_id).await?;
        if let Some(open) = CounterOfferChain::live(parent.root_trade_id, &chain)? {
            if open.trade_id != parent.trade_id {
                return Err(EngineError::InvalidState(format!(
                    "trade {} is not the open offer of chain {}",
                    parent.trade_id, parent.root_trade_id
                )));
            }
        }
        let child = CounterOfferChain::derive(&parent, request.message, now);
        let child_lines = TradeLines::new(request.escrow_cards, request.requested_cards);
        let require_tradeable = !child.is_self_transfer();
        self.escrow
            .check_lines(child.initiator_inventory_id, &child_lines.escrow, require_tradeable)
            .await?;
        let parent_lines = self.trades.get_lines(trade_id).await?;

        let mut saga = Saga::new("counter_offer");
        let result = async {
            self.claim(&parent, &outcome.next, &mut saga).await?;
            self.escrow
                .unlock_lines(parent.initiator_inventory_id, &parent_lines.escrow, &mut saga)
                .await?;
            self.escrow
                .lock_lines(
                    child.initiator_inventory_id,
                    &child_lines.escrow,
                    require_tradeable,
                    &mut saga,
                )
                .await?;
            self.trades.insert_trade(&child, &child_lines).await?;
            saga.push(Compensation::DeleteTrade(child.trade_id));
            self.history
                .record(
                    child.trade_id,
                    child.root_trade_id,
                    actor,
                    TradeAction::CounterOffered,
                    json!({
                        "parent_trade_id": parent.trade_id,
                        "counter_count": child.counter_count,
                        "escrow_cards": child_lines.escrow,
                        "requested_cards": child_lines.requested,
                    }),
                )
                .await?;
            Ok::<_, EngineError>(child)
        }
        .await;
        let stored = self.finish(saga, result).await?;
        tracing::info!(
            parent_trade_id = %trade_id,
            trade_id = %stored.trade_id,
            root_trade_id = %stored.root_trade_id,
            counter_count = stored.counter_count,
            actor,
            "Counter-offer created."
        );
        self.view(stored).await
    }

    /// Records one side's confirmation. The second confirmation settles the
    /// trade.
    pub async fn confirm_trade(&self, trade_id: TradeId, actor: &str) -> Result<TradeView, EngineError> {
        let (_chain, trade) = self.lock_chain(trade_id).await?;
        let outcome = TradeStateMachine::transition(&trade, Transition::Confirm, actor, Utc::now())?;

        let mut saga = Saga::new("confirm_trade");
        let result = async {
            self.claim(&trade, &outcome.next, &mut saga).await?;
            if outcome.settle {
                let lines = self.trades.get_lines(trade_id).await?;
                let transfers = self.settlement.execute(&outcome.next, &lines, &mut saga).await?;
                self.history
                    .record(
                        trade_id,
                        trade.root_trade_id,
                        actor,
                        TradeAction::Completed,
                        json!({ "transfers": transfers }),
                    )
                    .await?;
            } else {
                self.history
                    .record(
                        trade_id,
                        trade.root_trade_id,
                        actor,
                        TradeAction::Confirmed,
                        json!({ "party": outcome.party }),
                    )
                    .await?;
            }
            Ok::<_, EngineError>(outcome.next)
        }
        .await;
        let stored = self.finish(saga, result).await?;
        if outcome.settle {
            tracing::info!(%trade_id, actor, "Trade settled.");
        } else {
            tracing::info!(%trade_id, actor, party = ?outcome.party, "Trade confirmed.");
        }
        self.view(stored).await
    }

    pub async fn unconfirm_trade(&self, trade_id: TradeId, actor: &str) -> Result<TradeView, EngineError> {
        let (_chain, trade) = self.lock_chain(trade_id).await?;
        let outcome = TradeStateMachine::transition(&trade, Transition::Unconfirm, actor, Utc::now())?;

        let mut saga = Saga::new("unconfirm_trade");
        let result = async {
            self.claim(&trade, &outcome.next, &mut saga).await?;
            self.history
                .record(
                    trade_id,
                    trade.root_trade_id,
                    actor,
                    TradeAction::Unconfirmed,
                    json!({ "party": outcome.party }),
                )
                .await?;
            Ok::<_, EngineError>(outcome.next)
        }
        .await;
        let stored = self.finish(saga, result).await?;
        tracing::info!(%trade_id, actor, party = ?outcome.party, "Confirmation withdrawn.");
        self.view(stored).await
    }

    // --- Queries ---

    pub async fn get_trade(&self, trade_id: TradeId) -> Result<TradeView, EngineError> {
        let trade = self.load(trade_id).await?;
        self.view(trade).await
    }

    /// The full negotiation history of the chain `trade_id` belongs to.
    pub async fn get_history(&self, trade_id: TradeId) -> Result<TradeHistory, EngineError> {
        let trade = self.load(trade_id).await?;
        let entries = self.history.entries(trade.root_trade_id).await?;
        let mut names: HashMap<String, Option<String>> = HashMap::new();
        let mut history = Vec::with_capacity(entries.len());
        for entry in entries {
            let actor_name = match names.get(&entry.actor_user_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.directory.user_name(&entry.actor_user_id).await?;
                    names.insert(entry.actor_user_id.clone(), name.clone());
                    name
                }
            };
            history.push(HistoryView { entry, actor_name });
        }
        Ok(TradeHistory {
            root_trade_id: trade.root_trade_id,
            history,
        })
    }

    /// The user's trades matching `filter`, newest first.
    pub async fn list_trades(&self, user_id: &str, filter: TradeFilter) -> Result<Vec<TradeRecord>, EngineError> {
        let trades = self.trades.list_for_user(user_id).await?;
        Ok(trades
            .into_iter()
            .filter(|trade| filter.matches(trade, user_id))
            .collect())
    }

    pub async fn trade_summary(&self, user_id: &str) -> Result<TradeSummary, EngineError> {
        let mut summary = TradeSummary::new(user_id);
        for trade in self.trades.list_for_user(user_id).await? {
            let lines = match trade.status {
                TradeStatus::Completed => Some(self.trades.get_lines(trade.trade_id).await?),
                _ => None,
            };
            summary.add(&trade, lines.as_ref());
        }
        Ok(summary)
    }

    /// Runs the line-item janitor. `retention_days` falls back to the
    /// configured default.
    pub async fn cleanup(&self, retention_days: Option<u32>, dry_run: bool) -> Result<CleanupReport, EngineError> {
        let days = retention_days.unwrap_or(self.options.default_retention_days);
        self.retention.run(days, dry_run, Utc::now()).await
    }

    // --- Steps ---

    async fn create_steps(
        &self,
        record: &TradeRecord,
        lines: &TradeLines,
        saga: &mut Saga,
    ) -> Result<TradeRecord, EngineError> {
        self.escrow
            .lock_lines(record.initiator_inventory_id, &lines.escrow, true, saga)
            .await?;
        self.trades.insert_trade(record, lines).await?;
        saga.push(Compensation::DeleteTrade(record.trade_id));
        self.history
            .record(
                record.trade_id,
                record.root_trade_id,
                &record.initiator_user_id,
                TradeAction::Created,
                created_details(record, lines),
            )
            .await?;
        Ok(record.clone())
    }

    /// Both sides are locked without the tradeable check, the items move, and
    /// the record is stored already completed.
    async fn self_transfer_steps(
        &self,
        record: &TradeRecord,
        lines: &TradeLines,
        saga: &mut Saga,
    ) -> Result<TradeRecord, EngineError> {
        for kind in [LineKind::Escrow, LineKind::Requested] {
            let inventory = self.inventory_for(record, kind);
            self.escrow
                .lock_lines(inventory, lines.get(kind), false, saga)
                .await?;
        }
        let completed = TradeStateMachine::complete_self_transfer(record, Utc::now());
        let transfers = self.settlement.execute(&completed, lines, saga).await?;
        self.trades.insert_trade(&completed, lines).await?;
        saga.push(Compensation::DeleteTrade(completed.trade_id));

        let actor = completed.initiator_user_id.as_str();
        self.history
            .record(
                completed.trade_id,
                completed.root_trade_id,
                actor,
                TradeAction::Created,
                created_details(record, lines),
            )
            .await?;
        self.history
            .record(
                completed.trade_id,
                completed.root_trade_id,
                actor,
                TradeAction::Completed,
                json!({ "transfers": transfers, "self_transfer": true }),
            )
            .await?;
        Ok(completed)
    }

    /// Reject and cancel: claim the terminal status, then hand the
    /// initiator's escrow back.
    async fn close(
        &self,
        trade_id: TradeId,
        actor: &str,
        transition: Transition,
        action: TradeAction,
        reason: Option<String>,
    ) -> Result<TradeRecord, EngineError> {
        let (_chain, trade) = self.lock_chain(trade_id).await?;
        let mut outcome = TradeStateMachine::transition(&trade, transition, actor, Utc::now())?;
        if reason.is_some() {
            outcome.next.cancel_reason = reason.clone();
        }
        let lines = self.trades.get_lines(trade_id).await?;

        let mut saga = Saga::new(action.as_str());
        let result = async {
            self.claim(&trade, &outcome.next, &mut saga).await?;
            self.escrow
                .unlock_lines(trade.initiator_inventory_id, &lines.escrow, &mut saga)
                .await?;
            self.history
                .record(
                    trade_id,
                    trade.root_trade_id,
                    actor,
                    action,
                    json!({ "released_escrow": lines.escrow, "reason": reason }),
                )
                .await?;
            Ok::<_, EngineError>(outcome.next)
        }
        .await;
        self.finish(saga, result).await
    }

    // --- Helpers ---

    /// Commits the saga on success and unwinds it on failure.
    async fn finish<T>(&self, saga: Saga, result: Result<T, EngineError>) -> Result<T, EngineError> {
        match result {
            Ok(value) => {
                saga.commit();
                Ok(value)
            }
            Err(e) => {
                let compensator = Compensator {
                    escrow: &self.escrow,
                    settlement: &self.settlement,
                    trades: self.trades.as_ref(),
                };
                saga.unwind(&compensator).await;
                Err(e)
            }
        }
    }

    /// Writes `next` over `current` if nobody has changed it meanwhile.
    async fn claim(&self, current: &TradeRecord, next: &TradeRecord, saga: &mut Saga) -> Result<(), EngineError> {
        if !self.trades.update_trade(current.version, next).await? {
            return Err(EngineError::Conflict(format!(
                "trade {} was modified concurrently",
                current.trade_id
            )));
        }
        saga.push(Compensation::RestoreTrade {
            previous: Box::new(current.clone()),
            current_version: next.version,
        });
        Ok(())
    }

    async fn load(&self, trade_id: TradeId) -> Result<TradeRecord, EngineError> {
        self.trades
            .get_trade(trade_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("trade {trade_id}")))
    }

    /// Takes the chain lock for `trade_id` and returns the trade as read under it.
    async fn lock_chain(&self, trade_id: TradeId) -> Result<(OwnedMutexGuard<()>, TradeRecord), EngineError> {
        let root = self.load(trade_id).await?.root_trade_id;
        let guard = self.chains.lock(&root).await;
        let trade = self.load(trade_id).await?;
        Ok((guard, trade))
    }

    async fn ensure_owner(&self, inventory_id: InventoryId, user_id: &str) -> Result<(), EngineError> {
        match self.directory.inventory_owner(inventory_id).await? {
            Some(owner) if owner == user_id => Ok(()),
            _ => Err(EngineError::NotFound(format!(
                "inventory {inventory_id} for user {user_id}"
            ))),
        }
    }

    fn inventory_for(&self, trade: &TradeRecord, kind: LineKind) -> InventoryId {
        match kind {
            LineKind::Escrow => trade.inventory_of(Party::Initiator),
            LineKind::Requested => trade.inventory_of(Party::Recipient),
        }
    }

    async fn view(&self, trade: TradeRecord) -> Result<TradeView, EngineError> {
        let lines = self.trades.get_lines(trade.trade_id).await?;
        let escrow_cards = self.resolve_lines(&lines.escrow).await?;
        let requested_cards = self.resolve_lines(&lines.requested).await?;
        let initiator_name = self.directory.user_name(&trade.initiator_user_id).await?;
        let recipient_name = self.directory.user_name(&trade.recipient_user_id).await?;
        let chain = self
            .trades
            .chain(trade.root_trade_id)
            .await?
            .iter()
            .map(ChainLink::from)
            .collect();
        Ok(TradeView {
            trade,
            escrow_cards,
            requested_cards,
            initiator_name,
            recipient_name,
            chain,
        })
    }

    async fn resolve_lines(&self, lines: &[TradeLine]) -> Result<Vec<LineView>, EngineError> {
        let mut resolved = Vec::with_capacity(lines.len());
        for line in lines {
            let details = self.directory.item_details(&line.item_id).await?;
            resolved.push(LineView::new(line, details));
        }
        Ok(resolved)
    }
}

fn created_details(record: &TradeRecord, lines: &TradeLines) -> serde_json::Value {
    json!({
        "initiator_inventory_id": record.initiator_inventory_id,
        "recipient_inventory_id": record.recipient_inventory_id,
        "escrow_cards": lines.escrow,
        "requested_cards": lines.requested,
        "message": record.message,
    })
}
