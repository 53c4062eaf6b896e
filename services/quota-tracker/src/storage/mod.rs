pub mod database;
pub mod error;
pub mod memory;
pub mod schema;

pub use database::SqliteQuotaStore;
pub use error::StorageError;
pub use memory::MemoryQuotaStore;

use chrono::{DateTime, Utc};

use crate::quota::{QuotaKind, QuotaRecord};

pub const QUOTA_DB_FILENAME: &str = "quotas.db";

/// Result of one admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// The state the decision was made against. On rejection none of it was
    /// persisted.
    pub record: QuotaRecord,
    pub exceeded: bool,
}

/// Sole owner of persisted quota records.
pub trait QuotaStore: Send + Sync {
    /// Atomically admit or reject one action for `(principal_id, quota_kind)`.
    ///
    /// An expired window is reset before the limit test. A rejected call
    /// leaves the stored counter untouched; an admitted call adds exactly one.
    /// `window_duration_ms` is only adopted when a window is opened or reset.
    fn check_and_increment(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
        window_duration_ms: u64,
        limit: u64,
    ) -> Result<CheckOutcome, StorageError>;

    /// Unconditionally add one and return the new state for the caller to
    /// compare against its limit.
    #[deprecated(
        note = "increments even when the caller then rejects, so retries inflate the counter; use check_and_increment"
    )]
    fn increment(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
        window_duration_ms: u64,
    ) -> Result<QuotaRecord, StorageError>;

    /// Read the current record without locking it.
    fn find(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
    ) -> Result<Option<QuotaRecord>, StorageError>;
}

/// Expiry reset, admission test and increment, applied to a working copy of
/// a record the caller holds exclusively. Returns `false` on rejection, in
/// which case the copy must be discarded rather than written back.
pub(crate) fn admit(
    record: &mut QuotaRecord,
    window_duration_ms: u64,
    limit: u64,
    now: DateTime<Utc>,
) -> bool {
    if record.is_window_expired(now) {
        record.reset_window(now);
        record.window_duration_ms = window_duration_ms;
    }
    if record.count >= limit {
        return false;
    }
    record.increment(now);
    true
}

/// Legacy path: reset when expired, then add one regardless of any limit.
pub(crate) fn bump(
    record: &mut QuotaRecord,
    window_duration_ms: u64,
    now: DateTime<Utc>,
) {
    if record.is_window_expired(now) {
        record.reset_window(now);
        record.window_duration_ms = window_duration_ms;
    }
    record.increment(now);
}
