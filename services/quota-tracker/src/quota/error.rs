use thiserror::Error;

use crate::storage::StorageError;

use super::QuotaKind;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("quota exceeded for {quota_kind}: {current_count}/{limit}, retry after {retry_after_seconds}s")]
    Exceeded {
        quota_kind: QuotaKind,
        limit: u64,
        retry_after_seconds: u64,
        current_count: u64,
    },
    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl QuotaError {
    /// Stable code for callers that render errors to their own clients.
    pub fn code(&self) -> &'static str {
        match self {
            QuotaError::Exceeded { .. } => "quota_exceeded",
            QuotaError::StorageError(err) if err.is_retryable() => "store_unavailable",
            QuotaError::StorageError(_) => "internal_error",
        }
    }

    pub fn is_exceeded(&self) -> bool {
        matches!(self, QuotaError::Exceeded { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            QuotaError::Exceeded { .. } => false,
            QuotaError::StorageError(err) => err.is_retryable(),
        }
    }
}
