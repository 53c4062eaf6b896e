use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use crate::config::QuotaTrackerConfig;
use crate::quota::QuotaCheckService;

pub struct ApiState {
    pub check_service: QuotaCheckService,
    pub config: Arc<QuotaTrackerConfig>,
}

impl ApiState {
    pub fn new(check_service: QuotaCheckService, config: QuotaTrackerConfig) -> Self {
        Self {
            check_service,
            config: Arc::new(config),
        }
    }
}
