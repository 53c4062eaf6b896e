use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::QuotaKind;

/// Counting window for one (principal, kind) pair.
///
/// The methods here are plain data operations. Callers must hold exclusive
/// access to the row while using them; the stores take care of that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub id: String,
    pub principal_id: String,
    pub quota_kind: QuotaKind,
    pub count: u64,
    pub window_start_at: DateTime<Utc>,
    pub window_duration_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuotaRecord {
    /// Fresh record with an empty window opening at `now`.
    pub fn new(
        principal_id: &str,
        quota_kind: QuotaKind,
        window_duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            principal_id: principal_id.to_string(),
            quota_kind,
            count: 0,
            window_start_at: now,
            window_duration_ms,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn window_end_ms(&self) -> i64 {
        let duration = i64::try_from(self.window_duration_ms).unwrap_or(i64::MAX);
        self.window_start_at.timestamp_millis().saturating_add(duration)
    }

    /// Strict: a window is still active at exactly its end instant.
    pub fn is_window_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() > self.window_end_ms()
    }

    pub fn reset_window(&mut self, now: DateTime<Utc>) {
        self.window_start_at = now;
        self.count = 0;
        self.updated_at = now;
    }

    pub fn increment(&mut self, now: DateTime<Utc>) {
        self.count = self.count.saturating_add(1);
        self.updated_at = now;
    }

    /// Milliseconds until the window closes, zero once it has.
    pub fn remaining_time(&self, now: DateTime<Utc>) -> u64 {
        let remaining = self.window_end_ms().saturating_sub(now.timestamp_millis());
        u64::try_from(remaining).unwrap_or(0)
    }
}
