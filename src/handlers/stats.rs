//! Sales reporting endpoints backed by store-side aggregation.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::errors::ServiceError;
use crate::services::orders::{OrderStatsResponse, TopProductResponse};
use crate::{ApiQuery, ApiResponse};

use super::AppState;

const DEFAULT_TOP_PRODUCTS: u64 = 10;

#[derive(Debug, Deserialize)]
pub struct TopProductsQuery {
    /// Kept as a string so out-of-range and non-numeric values get the
    /// same 400 instead of a deserializer rejection.
    pub limit: Option<String>,
}

/// Aggregate order statistics
#[utoipa::path(
    get,
    path = "/api/stats/orders",
    responses(
        (status = 200, description = "Counts, revenue and average order value", body = ApiResponse<OrderStatsResponse>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "stats"
)]
pub async fn order_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.services.orders.get_order_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// Top-selling products across completed orders
#[utoipa::path(
    get,
    path = "/api/stats/top-products",
    params(("limit" = Option<u64>, Query, description = "Number of rows, 1-100, default 10")),
    responses(
        (status = 200, description = "Best sellers by quantity", body = ApiResponse<Vec<TopProductResponse>>),
        (status = 400, description = "Invalid limit parameter"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "stats"
)]
pub async fn top_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TopProductsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let limit = match query.limit.as_deref() {
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|l| (1..=100).contains(l))
            .ok_or_else(|| ServiceError::InvalidInput("Invalid limit parameter".to_string()))?,
        None => DEFAULT_TOP_PRODUCTS,
    };

    let products = state.services.orders.get_top_products(limit).await?;
    Ok(Json(ApiResponse::success(products)))
}
