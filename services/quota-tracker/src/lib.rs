pub mod api;
pub mod config;
pub mod quota;
pub mod storage;

pub use api::{create_router, ApiState, CheckQuotaRequest, CheckQuotaResponse, ErrorResponse};
pub use config::{QuotaTrackerConfig, StoreBackend};
pub use quota::{
    Clock, LimitPolicy, LimitPolicyResolver, ManualClock, QuotaCheckService, QuotaError,
    QuotaKind, QuotaRecord, StaticPolicyResolver, SystemClock,
};
pub use storage::{CheckOutcome, MemoryQuotaStore, QuotaStore, SqliteQuotaStore, StorageError};
