//! Point-of-sale backend library.
//!
//! Product catalog, order intake and fulfillment with server-side pricing,
//! CSV catalog import, and sales statistics, served over HTTP on top of a
//! relational store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod ids;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{AuthRouterExt, ROLE_ADMIN};
use crate::errors::ServiceError;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common query parameters for list endpoints
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page must be a positive integer"))]
    pub page: u64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl ListQuery {
    /// Store offset for the requested page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1) * self.limit
    }
}

/// Uniform response envelope.
///
/// Successes carry `data` (plus `meta` on paginated lists), failures carry
/// `error`. Acknowledgements with nothing to return are `{"success": true}`
/// alone.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Error payload inside the envelope. `details` is reserved for structured
/// validation context; field-level messages currently travel in `message`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Pagination block for list responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct Meta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: None,
        }
    }

    pub fn success_with_meta(data: T, meta: Meta) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(meta),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message,
                details: None,
            }),
            meta: None,
        }
    }
}

impl ApiResponse<()> {
    /// Bare `{"success": true}` acknowledgement for deletes.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            meta: None,
        }
    }
}

/// `Json` extractor variant whose rejections come back inside the standard
/// envelope as a 400 instead of axum's plain-text response.
pub struct ApiJson<T>(pub T);

#[async_trait::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ServiceError::ValidationError(rejection.body_text())),
        }
    }
}

/// `Query` counterpart of [`ApiJson`].
pub struct ApiQuery<T>(pub T);

#[async_trait::async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(ServiceError::InvalidInput(rejection.body_text())),
        }
    }
}

/// Routes mounted under `/api`, grouped by access tier. Tier routers that
/// share a path with different methods merge into one method router.
pub fn api_routes() -> Router<AppState> {
    // Public surface: catalog reads, cart checkout, order lookup by code
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/auth/login", post(handlers::auth::login))
        .route("/orders", post(handlers::orders::create_order))
        .route(
            "/orders/code/:code",
            get(handlers::orders::get_order_by_code),
        )
        .route("/products", get(handlers::products::list_products))
        .route("/products/search", get(handlers::products::search_products))
        .route("/products/:id", get(handlers::products::get_product));

    // Any authenticated user (cashier or admin)
    let authenticated = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/status",
            patch(handlers::orders::update_order_status),
        )
        .route(
            "/orders/:id/complete",
            post(handlers::orders::complete_order),
        )
        .route("/stats/orders", get(handlers::stats::order_stats))
        .route("/stats/top-products", get(handlers::stats::top_products))
        .with_auth();

    // Admin-only management surface
    let admin = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/products", post(handlers::products::create_product))
        .route(
            "/products/:id",
            put(handlers::products::update_product).delete(handlers::products::delete_product),
        )
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/users/:id",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/import/csv", post(handlers::imports::import_csv))
        .with_role(ROLE_ADMIN);

    public.merge(authenticated).merge(admin)
}

/// JSON 404 for anything outside the routing table.
pub async fn endpoint_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("Endpoint not found".to_string())),
    )
}
