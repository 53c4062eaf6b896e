use serde::{Deserialize, Serialize};

use crate::quota::{QuotaKind, QuotaRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckQuotaRequest {
    pub principal_id: String,
    pub quota_kind: QuotaKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckQuotaResponse {
    pub allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaExceededResponse {
    pub error: String,
    pub code: String,
    pub quota_kind: QuotaKind,
    pub limit: u64,
    pub retry_after_seconds: u64,
    pub current_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetQuotaResponse {
    pub record: QuotaRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub quota_kind: QuotaKind,
    pub limit: u64,
    pub window_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}
