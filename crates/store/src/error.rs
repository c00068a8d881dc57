use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Stored value is out of range: {0}")]
    Corrupt(String),

    #[error("Record already exists: {0}")]
    Duplicate(String),
}
