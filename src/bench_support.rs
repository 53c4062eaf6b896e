use std::sync::Arc;
use std::time::Duration;

use fair_use_quota_tracker::{
    LimitPolicy, MemoryQuotaStore, QuotaCheckService, QuotaKind, QuotaStore, SqliteQuotaStore,
    StaticPolicyResolver, SystemClock,
};
use tempfile::TempDir;

pub use fair_use_quota_tracker;

pub struct CheckBenchFixture {
    pub service: QuotaCheckService,
    pub store: Arc<dyn QuotaStore>,
    pub quota_kind: QuotaKind,
    // Keeps the SQLite file alive for the fixture's lifetime.
    _temp_dir: Option<TempDir>,
}

impl CheckBenchFixture {
    pub fn sqlite(limit: u64) -> Self {
        let temp_dir = TempDir::new().expect("tempdir");
        let store = SqliteQuotaStore::new(
            temp_dir.path().to_path_buf(),
            Duration::from_secs(5),
            Arc::new(SystemClock),
        )
        .expect("sqlite store for fixture");
        Self::with_store(Arc::new(store), limit, Some(temp_dir))
    }

    pub fn memory(limit: u64) -> Self {
        Self::with_store(
            Arc::new(MemoryQuotaStore::new(Arc::new(SystemClock))),
            limit,
            None,
        )
    }

    fn with_store(store: Arc<dyn QuotaStore>, limit: u64, temp_dir: Option<TempDir>) -> Self {
        let policy = LimitPolicy::new(limit, Duration::from_secs(3600)).expect("non-zero policy");
        let resolver = StaticPolicyResolver::new(policy);
        let service =
            QuotaCheckService::new(Arc::clone(&store), Arc::new(resolver), Arc::new(SystemClock));
        Self {
            service,
            store,
            quota_kind: QuotaKind::FairUseMessages,
            _temp_dir: temp_dir,
        }
    }

    /// Drive `principal_id` to its limit so every further check is rejected.
    pub fn exhaust(&self, principal_id: &str) {
        while self.service.execute(principal_id, &self.quota_kind).is_ok() {}
    }
}
