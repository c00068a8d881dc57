//! # Riftventory Engine Crate
//!
//! The trade settlement engine. It moves card quantities between two
//! inventories exactly once, keeps items that are offered in several trades
//! from being spent twice, and carries a negotiation through any number of
//! counter-offers before both parties confirm.
//!
//! The backing store only guarantees single-row atomicity. The engine closes
//! the gaps with per-key async locks, compare-and-swap writes that retry on
//! conflict, and a compensation log that undoes the applied steps of an
//! action that fails part-way.
//!
//! ## Public API
//!
//! - `TradeService`: the action surface (create, accept, reject, cancel,
//!   counter, confirm, unconfirm) plus queries and retention cleanup.
//! - `TradeStateMachine`: the lifecycle rules, in one function.
//! - `EscrowLockManager`, `SettlementExecutor`, `NegotiationHistory`,
//!   `CounterOfferChain`, `RetentionCleanup`: the components the service
//!   composes.
//! - `EngineError`: every failure an action can report.

pub mod counter;
pub mod error;
pub mod escrow;
pub mod history;
pub mod ledger;
pub mod locks;
pub mod retention;
pub mod saga;
pub mod service;
pub mod settlement;
pub mod state_machine;
pub mod view;

pub use counter::CounterOfferChain;
pub use error::EngineError;
pub use escrow::EscrowLockManager;
pub use history::NegotiationHistory;
pub use ledger::HoldingLedger;
pub use locks::KeyedLocks;
pub use retention::{CleanupReport, RetentionCleanup};
pub use saga::{Compensation, Saga};
pub use service::{EngineOptions, TradeService};
pub use settlement::{SettlementExecutor, Transfer};
pub use state_machine::{Outcome, TradeStateMachine, Transition};
pub use view::{
    ChainLink, CounterOffer, CreateTrade, HistoryView, LineView, TradeFilter, TradeHistory,
    TradeSummary, TradeView,
};
