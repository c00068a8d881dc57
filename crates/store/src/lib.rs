//! # Riftventory Store Crate
//!
//! The persistence contracts the settlement engine is written against, and an
//! in-memory implementation of all of them.
//!
//! The contracts only promise single-row atomicity: a holding is changed with a
//! compare-and-swap on its `(quantity, locked_quantity)` pair, a trade with a
//! compare-and-swap on its version, and a history entry is refused if its
//! sequence number is already taken. Nothing here spans rows; the engine builds
//! multi-row consistency on top.
//!
//! ## Public API
//!
//! - `HoldingStore`, `TradeStore`, `HistoryStore`, `Directory`: the contracts.
//! - `Backend`: all four at once, blanket-implemented.
//! - `MemoryStore`: an in-process backend with fault injection for tests.
//! - `StoreError`: the errors a backend may surface.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use memory::{FaultPoint, MemoryStore};
pub use traits::{Backend, Directory, HistoryStore, HoldingStore, LineCounts, TradeStore};
