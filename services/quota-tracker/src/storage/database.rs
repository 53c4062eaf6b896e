use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::quota::{Clock, QuotaKind, QuotaRecord};

use super::error::StorageError;
use super::schema::init_database;
use super::{admit, bump, CheckOutcome, QuotaStore, QUOTA_DB_FILENAME};

const SELECT_RECORD: &str = r#"
SELECT id, principal_id, quota_kind, count, window_start_at, window_duration_ms, created_at, updated_at
FROM quota_records
WHERE principal_id = ?1 AND quota_kind = ?2
"#;

/// Quota store backed by a SQLite file.
///
/// Several instances, in this process or others, may open the same file.
/// Each check runs inside a `BEGIN IMMEDIATE` transaction, which takes the
/// database write lock before the row is read; concurrent checks wait on
/// that lock for at most the configured busy timeout. SQLite has no row
/// locks, so checks on different keys are serialized as well.
pub struct SqliteQuotaStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteQuotaStore {
    /// Open (or create) `quotas.db` inside `data_dir`.
    pub fn new(
        data_dir: PathBuf,
        busy_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&data_dir)?;
        Self::open(&data_dir.join(QUOTA_DB_FILENAME), busy_timeout, clock)
    }

    pub fn open(
        db_path: &Path,
        busy_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(busy_timeout)?;
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        init_database(&conn)?;
        info!(path = %db_path.display(), journal_mode = %journal_mode, "opened quota database");

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    /// Private in-memory database, mostly useful in tests.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Create an empty record unless one already exists. Losing the race to
    /// another creator is a no-op.
    fn materialize(
        conn: &Connection,
        principal_id: &str,
        quota_kind: &QuotaKind,
        window_duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let inserted = conn.execute(
            r#"
            INSERT INTO quota_records (
                id, principal_id, quota_kind, count, window_start_at, window_duration_ms, created_at, updated_at
            ) VALUES (?1, ?2, ?3, 0, ?4, ?5, ?4, ?4)
            ON CONFLICT(principal_id, quota_kind) DO NOTHING
            "#,
            params![
                Uuid::new_v4().to_string(),
                principal_id,
                quota_kind.as_str(),
                now,
                window_duration_ms as i64,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn load(
        conn: &Connection,
        principal_id: &str,
        quota_kind: &QuotaKind,
    ) -> Result<Option<QuotaRecord>, StorageError> {
        let mut stmt = conn.prepare_cached(SELECT_RECORD)?;
        let record = stmt
            .query_row(params![principal_id, quota_kind.as_str()], map_record)
            .optional()?;
        Ok(record)
    }

    fn load_existing(
        conn: &Connection,
        principal_id: &str,
        quota_kind: &QuotaKind,
    ) -> Result<QuotaRecord, StorageError> {
        Self::load(conn, principal_id, quota_kind)?.ok_or_else(|| StorageError::MissingRecord {
            principal_id: principal_id.to_string(),
            quota_kind: quota_kind.to_string(),
        })
    }

    fn save(conn: &Connection, record: &QuotaRecord) -> Result<(), StorageError> {
        conn.execute(
            r#"
            UPDATE quota_records
            SET count = ?1, window_start_at = ?2, window_duration_ms = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                record.count as i64,
                record.window_start_at,
                record.window_duration_ms as i64,
                record.updated_at,
                record.id,
            ],
        )?;
        Ok(())
    }
}

impl QuotaStore for SqliteQuotaStore {
    fn check_and_increment(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
        window_duration_ms: u64,
        limit: u64,
    ) -> Result<CheckOutcome, StorageError> {
        let mut conn = self.lock()?;

        if Self::materialize(&conn, principal_id, quota_kind, window_duration_ms, self.clock.now())? {
            debug!(principal_id, quota_kind = %quota_kind, "created quota record");
        }

        // Dropping the transaction on any early return rolls it back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = self.clock.now();
        let mut record = Self::load_existing(&tx, principal_id, quota_kind)?;

        if !admit(&mut record, window_duration_ms, limit, now) {
            tx.rollback()?;
            return Ok(CheckOutcome {
                record,
                exceeded: true,
            });
        }

        Self::save(&tx, &record)?;
        tx.commit()?;

        Ok(CheckOutcome {
            record,
            exceeded: false,
        })
    }

    fn increment(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
        window_duration_ms: u64,
    ) -> Result<QuotaRecord, StorageError> {
        let mut conn = self.lock()?;
        Self::materialize(&conn, principal_id, quota_kind, window_duration_ms, self.clock.now())?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = self.clock.now();
        let mut record = Self::load_existing(&tx, principal_id, quota_kind)?;
        bump(&mut record, window_duration_ms, now);
        Self::save(&tx, &record)?;
        tx.commit()?;

        Ok(record)
    }

    fn find(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
    ) -> Result<Option<QuotaRecord>, StorageError> {
        let conn = self.lock()?;
        Self::load(&conn, principal_id, quota_kind)
    }
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<QuotaRecord> {
    Ok(QuotaRecord {
        id: row.get(0)?,
        principal_id: row.get(1)?,
        quota_kind: QuotaKind::from(row.get::<_, String>(2)?),
        count: row.get::<_, i64>(3)? as u64,
        window_start_at: row.get(4)?,
        window_duration_ms: row.get::<_, i64>(5)? as u64,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::quota::ManualClock;

    fn store() -> (SqliteQuotaStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = SqliteQuotaStore::in_memory(clock.clone()).expect("in-memory store");
        (store, clock)
    }

    #[test]
    fn first_check_creates_record_with_count_one() {
        let (store, _) = store();
        let kind = QuotaKind::FairUseMessages;

        assert!(store.find("user-1", &kind).unwrap().is_none());
        let outcome = store.check_and_increment("user-1", &kind, 1_000, 3).unwrap();
        assert!(!outcome.exceeded);
        assert_eq!(outcome.record.count, 1);

        let stored = store.find("user-1", &kind).unwrap().expect("record persisted");
        assert_eq!(stored, outcome.record);
    }

    #[test]
    fn zero_limit_rejects_first_action() {
        let (store, _) = store();
        let kind = QuotaKind::from("exports");

        let outcome = store.check_and_increment("user-1", &kind, 1_000, 0).unwrap();
        assert!(outcome.exceeded);
        assert_eq!(outcome.record.count, 0);
        assert_eq!(store.find("user-1", &kind).unwrap().unwrap().count, 0);
    }

    #[test]
    fn rejection_leaves_row_untouched() {
        let (store, clock) = store();
        let kind = QuotaKind::FairUseMessages;
        store.check_and_increment("user-1", &kind, 10_000, 1).unwrap();
        let before = store.find("user-1", &kind).unwrap().unwrap();

        clock.advance_ms(50);
        for _ in 0..5 {
            let outcome = store.check_and_increment("user-1", &kind, 10_000, 1).unwrap();
            assert!(outcome.exceeded);
        }

        let after = store.find("user-1", &kind).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn timestamps_survive_round_trip() {
        let (store, clock) = store();
        let kind = QuotaKind::FairUseMessages;
        let outcome = store.check_and_increment("user-1", &kind, 1_000, 3).unwrap();
        let stored = store.find("user-1", &kind).unwrap().unwrap();

        assert_eq!(stored.window_start_at, clock.now());
        assert_eq!(stored.created_at, outcome.record.created_at);
        assert_eq!(stored.window_duration_ms, 1_000);
    }

    #[test]
    #[allow(deprecated)]
    fn legacy_increment_ignores_limits() {
        let (store, _) = store();
        let kind = QuotaKind::FairUseMessages;
        for expected in 1..=4 {
            let record = store.increment("user-1", &kind, 1_000).unwrap();
            assert_eq!(record.count, expected);
        }
    }

    #[test]
    fn rejected_reset_is_not_stored() {
        let (store, clock) = store();
        let kind = QuotaKind::FairUseMessages;
        store.check_and_increment("user-1", &kind, 1_000, 1).unwrap();
        let before = store.find("user-1", &kind).unwrap().unwrap();

        clock.advance_ms(2_000);
        let outcome = store.check_and_increment("user-1", &kind, 1_000, 0).unwrap();
        assert!(outcome.exceeded);
        assert_eq!(outcome.record.count, 0);

        assert_eq!(store.find("user-1", &kind).unwrap().unwrap(), before);
    }

    #[test]
    fn failed_write_rolls_back_reset() {
        let (store, clock) = store();
        let kind = QuotaKind::FairUseMessages;
        for _ in 0..2 {
            store.check_and_increment("user-1", &kind, 1_000, 2).unwrap();
        }
        let before = store.find("user-1", &kind).unwrap().unwrap();

        store
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_updates BEFORE UPDATE ON quota_records
                 BEGIN SELECT RAISE(ABORT, 'update rejected'); END;",
            )
            .unwrap();

        clock.advance_ms(1_001);
        let err = store
            .check_and_increment("user-1", &kind, 1_000, 2)
            .unwrap_err();
        assert!(matches!(err, StorageError::DatabaseError(_)));
        assert!(!err.is_retryable());
        assert_eq!(store.find("user-1", &kind).unwrap().unwrap(), before);

        store
            .lock()
            .unwrap()
            .execute_batch("DROP TRIGGER reject_updates;")
            .unwrap();
        let outcome = store.check_and_increment("user-1", &kind, 1_000, 2).unwrap();
        assert!(!outcome.exceeded);
        assert_eq!(outcome.record.count, 1);
        assert_eq!(outcome.record.window_start_at, clock.now());
    }

    #[test]
    fn timestamps_are_stored_as_text() {
        let (store, _) = store();
        let kind = QuotaKind::FairUseMessages;
        store.check_and_increment("user-1", &kind, 1_000, 3).unwrap();

        let conn = store.lock().unwrap();
        let types: (String, String, String) = conn
            .query_row(
                "SELECT typeof(window_start_at), typeof(created_at), typeof(updated_at)
                 FROM quota_records",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(types, ("text".into(), "text".into(), "text".into()));
    }
}
