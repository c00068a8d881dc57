pub mod enums;
pub mod error;
pub mod structs;
pub mod validation;

// Re-export the core types to provide a clean public API.
pub use enums::{LineKind, Party, RoleFilter, TradeAction, TradeStatus};
pub use error::CoreError;
pub use structs::{
    Counts, HistoryEntry, Holding, HoldingKey, InventoryId, ItemDetails, ItemId, TradeId,
    TradeLine, TradeLines, TradeRecord, UserId,
};
