use std::io;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("quota record for principal {principal_id} ({quota_kind}) vanished after materialization")]
    MissingRecord {
        principal_id: String,
        quota_kind: String,
    },
    #[error("quota store lock poisoned")]
    LockPoisoned,
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

impl StorageError {
    /// Whether re-running the whole check may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::DatabaseError(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
            ),
            StorageError::DatabaseError(_) => false,
            StorageError::IoError(_) => true,
            StorageError::MissingRecord { .. } | StorageError::LockPoisoned => false,
        }
    }
}
