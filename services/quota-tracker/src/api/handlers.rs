use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::quota::{QuotaError, QuotaKind};

use super::types::{
    CheckQuotaRequest, CheckQuotaResponse, ErrorResponse, GetQuotaResponse, PolicyResponse,
    QuotaExceededResponse,
};
use super::ApiState;

type ApiResult<T> = Result<Json<T>, Response>;

pub async fn check_quota(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CheckQuotaRequest>,
) -> ApiResult<CheckQuotaResponse> {
    let principal_id = normalize_principal(&request.principal_id)?;
    let service = state.check_service.clone();
    let quota_kind = request.quota_kind;
    let result = tokio::task::spawn_blocking(move || service.execute(&principal_id, &quota_kind))
        .await
        .map_err(internal_error)?;

    match result {
        Ok(()) => Ok(Json(CheckQuotaResponse { allowed: true })),
        Err(err) => Err(quota_error(err)),
    }
}

pub async fn get_quota(
    State(state): State<Arc<ApiState>>,
    Path((principal_id, quota_kind)): Path<(String, String)>,
) -> ApiResult<GetQuotaResponse> {
    let principal_id = normalize_principal(&principal_id)?;
    let store = Arc::clone(state.check_service.store());
    let quota_kind = QuotaKind::from(quota_kind);
    let record = tokio::task::spawn_blocking(move || store.find(&principal_id, &quota_kind))
        .await
        .map_err(internal_error)?
        .map_err(|err| quota_error(err.into()))?;

    match record {
        Some(record) => Ok(Json(GetQuotaResponse { record })),
        None => Err(not_found("quota_not_found", "no quota record for principal")),
    }
}

pub async fn get_policy(
    State(state): State<Arc<ApiState>>,
    Path(quota_kind): Path<String>,
) -> ApiResult<PolicyResponse> {
    let quota_kind = QuotaKind::from(quota_kind);
    let policy = state.check_service.policy_for("", &quota_kind);
    Ok(Json(PolicyResponse {
        quota_kind,
        limit: policy.limit(),
        window_duration_ms: policy.window_duration_ms(),
    }))
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "quota-tracker"
    })))
}

/// Principals are keyed without surrounding whitespace on every route.
fn normalize_principal(raw: &str) -> Result<String, Response> {
    let principal_id = raw.trim();
    if principal_id.is_empty() {
        return Err(bad_request(
            "invalid_principal_id",
            "principal_id cannot be empty",
        ));
    }
    Ok(principal_id.to_string())
}

fn quota_error(err: QuotaError) -> Response {
    match err {
        QuotaError::Exceeded {
            quota_kind,
            limit,
            retry_after_seconds,
            current_count,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after_seconds.to_string())],
            Json(QuotaExceededResponse {
                error: format!("{quota_kind} quota exhausted, slow down"),
                code: "quota_exceeded".to_string(),
                quota_kind,
                limit,
                retry_after_seconds,
                current_count,
            }),
        )
            .into_response(),
        err if err.is_retryable() => {
            error!(error = %err, "quota store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "quota store unavailable".to_string(),
                    code: err.code().to_string(),
                    details: None,
                }),
            )
                .into_response()
        }
        err => internal_error(err),
    }
}

fn bad_request(code: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
        .into_response()
}

fn not_found(code: &str, message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
        .into_response()
}

fn internal_error<E: std::fmt::Display>(err: E) -> Response {
    error!(error = %err, "quota API internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
            code: "internal_error".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
        .into_response()
}
