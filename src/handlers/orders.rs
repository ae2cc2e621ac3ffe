//! Order intake, lookup, and fulfillment endpoints.
//!
//! Creation is public (the storefront posts carts without a token); listing
//! and state transitions require authentication. Pricing is entirely
//! server-side, see [`crate::services::orders`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::entities::order::{OrderStatus, PaymentMethod};
use crate::errors::ServiceError;
use crate::handlers::parse_id;
use crate::services::orders::{CreateOrderRequest, OrderListFilter, OrderResponse};
use crate::{ApiJson, ApiQuery, ApiResponse, Meta};

use super::AppState;

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page must be a positive integer"))]
    pub page: u64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: u64,
    /// Filter by order status
    pub status: Option<String>,
    /// Inclusive lower bound on creation time, RFC 3339
    pub start_date: Option<String>,
    /// Inclusive upper bound on creation time, RFC 3339
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    /// One of PENDING, PROCESSING, COMPLETED, CANCELLED
    #[schema(example = "PROCESSING")]
    pub status: String,
    /// Replacement notes; absent or empty leaves the stored notes alone
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOrderRequest {
    /// One of CASH, CARD, MOBILE_PAYMENT, OTHER
    #[schema(example = "CARD")]
    pub payment_method: String,
    /// Accepted for wire compatibility; completion always marks the order paid
    pub payment_status: Option<String>,
    pub notes: Option<String>,
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    raw.parse::<OrderStatus>()
        .map_err(|_| ServiceError::InvalidInput(format!("Invalid order status: {}", raw)))
}

fn parse_payment_method(raw: &str) -> Result<PaymentMethod, ServiceError> {
    raw.parse::<PaymentMethod>()
        .map_err(|_| ServiceError::InvalidInput(format!("Invalid payment method: {}", raw)))
}

fn parse_date(raw: &str, name: &str) -> Result<DateTime<Utc>, ServiceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ServiceError::InvalidInput(format!("Invalid {} parameter", name)))
}

/// Create an order from a cart
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Empty cart or unresolvable SKU")
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_order(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// Look up an order by its public code
#[utoipa::path(
    get,
    path = "/api/orders/code/:code",
    params(("code" = String, Path, description = "8-character order code")),
    responses(
        (status = 200, description = "Order returned", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Unknown code")
    ),
    tag = "orders"
)]
pub async fn get_order_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_by_code(&code)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

    Ok(Json(ApiResponse::success(order)))
}

/// Get an order by id
#[utoipa::path(
    get,
    path = "/api/orders/:id",
    params(("id" = String, Path, description = "Order ID (UUID)")),
    responses(
        (status = 200, description = "Order returned", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "order")?;
    let order = state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

    Ok(Json(ApiResponse::success(order)))
}

/// List orders with optional status and date filters
#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<u64>, Query, description = "1-based page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Page size, 1-100, default 20"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("startDate" = Option<String>, Query, description = "Created-at lower bound, RFC 3339"),
        ("endDate" = Option<String>, Query, description = "Created-at upper bound, RFC 3339")
    ),
    responses(
        (status = 200, description = "Orders with pagination meta", body = ApiResponse<Vec<OrderResponse>>),
        (status = 400, description = "Invalid filter"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    query.validate()?;

    let status = query.status.as_deref().map(parse_order_status).transpose()?;
    let start_date = query
        .start_date
        .as_deref()
        .map(|raw| parse_date(raw, "startDate"))
        .transpose()?;
    let end_date = query
        .end_date
        .as_deref()
        .map(|raw| parse_date(raw, "endDate"))
        .transpose()?;

    let filter = OrderListFilter {
        limit: query.limit,
        offset: query.page.saturating_sub(1) * query.limit,
        status,
        start_date,
        end_date,
    };

    let result = state.services.orders.list_orders(filter).await?;

    Ok(Json(ApiResponse::success_with_meta(
        result.orders,
        Meta {
            page: query.page,
            limit: query.limit,
            total: result.total,
        },
    )))
}

/// Transition an order to a new status
#[utoipa::path(
    patch,
    path = "/api/orders/:id/status",
    params(("id" = String, Path, description = "Order ID (UUID)")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid status"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "order")?;
    let status = parse_order_status(&payload.status)?;

    let order = state
        .services
        .orders
        .update_order_status(id, status, payload.notes)
        .await?;

    Ok(Json(ApiResponse::success(order)))
}

/// Complete an order and record payment in one step
#[utoipa::path(
    post,
    path = "/api/orders/:id/complete",
    params(("id" = String, Path, description = "Order ID (UUID)")),
    request_body = CompleteOrderRequest,
    responses(
        (status = 200, description = "Order completed and paid", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid payment method"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn complete_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<CompleteOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "order")?;
    let payment_method = parse_payment_method(&payload.payment_method)?;

    let order = state
        .services
        .orders
        .complete_order(id, payment_method, payload.notes)
        .await?;

    Ok(Json(ApiResponse::success(order)))
}
