use std::fmt;

/// Errors from the storage façade.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// The built-in integrity check reported corruption.
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite: {e}"),
            StoreError::Corrupt(msg) => write!(f, "integrity check failed: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}
