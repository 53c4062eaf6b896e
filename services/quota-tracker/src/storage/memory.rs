use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use crate::quota::{Clock, QuotaKind, QuotaRecord};

use super::error::StorageError;
use super::{admit, bump, CheckOutcome, QuotaStore};

type RecordKey = (String, QuotaKind);

/// Process-local quota store with one lock per record.
///
/// Checks on the same key serialize on that record's mutex; checks on
/// different keys never contend beyond the map shard lookup. Only suitable
/// when a single instance serves all traffic.
pub struct MemoryQuotaStore {
    rows: DashMap<RecordKey, Arc<Mutex<QuotaRecord>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryQuotaStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn materialize(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
        window_duration_ms: u64,
    ) -> Arc<Mutex<QuotaRecord>> {
        let key = (principal_id.to_string(), quota_kind.clone());
        let entry = self.rows.entry(key).or_insert_with(|| {
            debug!(principal_id, quota_kind = %quota_kind, "created quota record");
            Arc::new(Mutex::new(QuotaRecord::new(
                principal_id,
                quota_kind.clone(),
                window_duration_ms,
                self.clock.now(),
            )))
        });
        Arc::clone(entry.value())
    }
}

impl QuotaStore for MemoryQuotaStore {
    fn check_and_increment(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
        window_duration_ms: u64,
        limit: u64,
    ) -> Result<CheckOutcome, StorageError> {
        let row = self.materialize(principal_id, quota_kind, window_duration_ms);
        let mut stored = row.lock().map_err(|_| StorageError::LockPoisoned)?;

        let now = self.clock.now();
        let mut record = stored.clone();
        if !admit(&mut record, window_duration_ms, limit, now) {
            return Ok(CheckOutcome {
                record,
                exceeded: true,
            });
        }

        *stored = record.clone();
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
        let row = self.materialize(principal_id, quota_kind, window_duration_ms);
        let mut stored = row.lock().map_err(|_| StorageError::LockPoisoned)?;
        bump(&mut stored, window_duration_ms, self.clock.now());
        Ok(stored.clone())
    }

    fn find(
        &self,
        principal_id: &str,
        quota_kind: &QuotaKind,
    ) -> Result<Option<QuotaRecord>, StorageError> {
        let key = (principal_id.to_string(), quota_kind.clone());
        let Some(row) = self.rows.get(&key).map(|entry| Arc::clone(entry.value())) else {
            return Ok(None);
        };
        let record = row.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(Some(record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::quota::ManualClock;

    #[test]
    fn records_are_keyed_by_principal_and_kind() {
        let store = MemoryQuotaStore::new(Arc::new(ManualClock::new(Utc::now())));
        store
            .check_and_increment("user-1", &QuotaKind::FairUseMessages, 1_000, 5)
            .unwrap();
        store
            .check_and_increment("user-1", &QuotaKind::from("exports"), 1_000, 5)
            .unwrap();
        store
            .check_and_increment("user-2", &QuotaKind::FairUseMessages, 1_000, 5)
            .unwrap();
        store
            .check_and_increment("user-1", &QuotaKind::FairUseMessages, 1_000, 5)
            .unwrap();

        assert_eq!(store.len(), 3);
        let record = store
            .find("user-1", &QuotaKind::FairUseMessages)
            .unwrap()
            .unwrap();
        assert_eq!(record.count, 2);
    }

    #[test]
    fn rejected_reset_is_not_stored() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryQuotaStore::new(clock.clone());
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
    fn missing_record_reads_as_none() {
        let store = MemoryQuotaStore::new(Arc::new(ManualClock::default()));
        assert!(store.find("nobody", &QuotaKind::FairUseMessages).unwrap().is_none());
        assert!(store.is_empty());
    }
}
