use rusqlite::Connection;

use super::error::StorageError;

pub const QUOTA_RECORDS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS quota_records (
    id TEXT PRIMARY KEY,
    principal_id TEXT NOT NULL,
    quota_kind TEXT NOT NULL,
    count INTEGER NOT NULL CHECK (count >= 0),
    window_start_at TEXT NOT NULL,
    window_duration_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(principal_id, quota_kind)
);
"#;

pub const QUOTA_RECORDS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_quota_records_principal ON quota_records(principal_id);
"#;

/// Idempotent; every store instance runs it on open.
pub fn init_database(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(QUOTA_RECORDS_TABLE_SCHEMA)?;
    conn.execute_batch(QUOTA_RECORDS_INDEXES)?;
    Ok(())
}
