use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::storage::QuotaStore;

use super::error::QuotaError;
use super::policy::{LimitPolicy, LimitPolicyResolver};
use super::{Clock, QuotaKind};

/// Gate for one more action of a given kind.
#[derive(Clone)]
pub struct QuotaCheckService {
    store: Arc<dyn QuotaStore>,
    resolver: Arc<dyn LimitPolicyResolver>,
    clock: Arc<dyn Clock>,
}

impl QuotaCheckService {
    pub fn new(
        store: Arc<dyn QuotaStore>,
        resolver: Arc<dyn LimitPolicyResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            resolver,
            clock,
        }
    }

    /// Record one action for `principal_id` or explain why it is refused.
    ///
    /// `Ok(())` means the action was counted and the caller may proceed.
    /// Store failures come back as [`QuotaError::StorageError`] and are never
    /// reported as an exceeded quota.
    pub fn execute(&self, principal_id: &str, quota_kind: &QuotaKind) -> Result<(), QuotaError> {
        let policy = self.resolver.resolve(principal_id, quota_kind);
        let outcome = self
            .store
            .check_and_increment(
                principal_id,
                quota_kind,
                policy.window_duration_ms(),
                policy.limit(),
            )
            .map_err(|err| {
                warn!(principal_id, quota_kind = %quota_kind, error = %err, "quota check failed");
                err
            })?;

        if outcome.exceeded {
            let remaining_ms = outcome.record.remaining_time(self.clock.now());
            let retry_after_seconds = remaining_ms.div_ceil(1_000);
            info!(
                principal_id,
                quota_kind = %quota_kind,
                limit = policy.limit(),
                current_count = outcome.record.count,
                retry_after_seconds,
                "quota exceeded"
            );
            return Err(QuotaError::Exceeded {
                quota_kind: quota_kind.clone(),
                limit: policy.limit(),
                retry_after_seconds,
                current_count: outcome.record.count,
            });
        }

        debug!(
            principal_id,
            quota_kind = %quota_kind,
            count = outcome.record.count,
            limit = policy.limit(),
            "quota check admitted"
        );
        Ok(())
    }

    pub fn policy_for(&self, principal_id: &str, quota_kind: &QuotaKind) -> LimitPolicy {
        self.resolver.resolve(principal_id, quota_kind)
    }

    pub fn store(&self) -> &Arc<dyn QuotaStore> {
        &self.store
    }
}
