use core_types::{CoreError, InventoryId, ItemId};
use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(
        "Insufficient quantity of {item_id} in inventory {inventory_id}: requested {requested}, available {available}"
    )]
    InsufficientAvailable {
        inventory_id: InventoryId,
        item_id: ItemId,
        requested: u32,
        available: u32,
    },

    #[error("Item {item_id} in inventory {inventory_id} is not marked as tradeable")]
    NotTradeable {
        inventory_id: InventoryId,
        item_id: ItemId,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(message) => EngineError::Validation(message),
            CoreError::InvalidInput(field, value) => {
                EngineError::Validation(format!("invalid {field}: {value}"))
            }
        }
    }
}
