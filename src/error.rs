use thiserror::Error;

use crate::row::MapError;

/// Errors raised by the connection manager and the tables built on it.
///
/// Store-level failures are carried as the original [`rusqlite::Error`];
/// nothing here retries or rewrites them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Statement text was empty. Raised before any connection is opened.
    #[error("statement text cannot be empty")]
    InvalidStatement,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// The open warm-up ran out of attempts without a store error to report.
    #[error("connection to {path} is not open")]
    ConnectionUnavailable { path: String },

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error(transparent)]
    Mapping(#[from] MapError),
}

impl StoreError {
    /// True when the store rejected a write because of a constraint
    /// (unique, primary key, not null, ...).
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
