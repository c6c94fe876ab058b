use carewatch_core::AlertError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A row that does not map back onto a domain type.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

impl StorageError {
    pub(crate) fn corrupt(table: &'static str, reason: impl ToString) -> Self {
        StorageError::Corrupt {
            table,
            reason: reason.to_string(),
        }
    }
}

impl From<StorageError> for AlertError {
    fn from(e: StorageError) -> Self {
        AlertError::Store(e.to_string())
    }
}
