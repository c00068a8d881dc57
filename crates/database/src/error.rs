use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("A row with the same key already exists: {0}")]
    Duplicate(String),

    #[error("Stored row could not be decoded: {0}")]
    Corrupt(String),
}

impl DbError {
    /// Classifies a failed insert, separating unique-key violations from
    /// everything else.
    pub(crate) fn on_insert(err: sqlx::Error, what: &str) -> Self {
        let unique_violation = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == "23505");
        if unique_violation {
            DbError::Duplicate(what.to_string())
        } else {
            DbError::QueryError(err)
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(what) => StoreError::Duplicate(what),
            DbError::Corrupt(what) => StoreError::Corrupt(what),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
