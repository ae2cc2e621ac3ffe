use axum::{response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::ApiResponse;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always "ok" while the server is accepting requests
    #[schema(example = "ok")]
    pub status: String,
    /// Server time in RFC 3339
    #[schema(example = "2025-01-15T10:30:00Z")]
    pub timestamp: String,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = ApiResponse<HealthResponse>)
    ),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
