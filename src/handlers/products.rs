//! Product catalog endpoints. Reads are public, writes are admin-gated
//! at the router.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::parse_id;
use crate::services::products::{CreateProductRequest, ProductResponse, UpdateProductRequest};
use crate::{ApiJson, ApiQuery, ApiResponse, ListQuery, Meta};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub sku: Option<String>,
}

/// List active products
#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("page" = Option<u64>, Query, description = "1-based page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Page size, 1-100, default 20")
    ),
    responses(
        (status = 200, description = "Products with pagination meta", body = ApiResponse<Vec<ProductResponse>>),
        (status = 400, description = "Invalid pagination")
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    query.validate()?;

    // The public catalog never shows retired products.
    let result = state
        .services
        .products
        .list_products(query.limit, query.offset(), true)
        .await?;

    Ok(Json(ApiResponse::success_with_meta(
        result.products,
        Meta {
            page: query.page,
            limit: query.limit,
            total: result.total,
        },
    )))
}

/// Search products by SKU fragment
#[utoipa::path(
    get,
    path = "/api/products/search",
    params(("sku" = String, Query, description = "SKU substring to match")),
    responses(
        (status = 200, description = "Matching active products", body = ApiResponse<Vec<ProductResponse>>),
        (status = 400, description = "Missing sku parameter")
    ),
    tag = "products"
)]
pub async fn search_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let fragment = query
        .sku
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::InvalidInput("SKU parameter is required".to_string()))?;

    let products = state.services.products.search_products(fragment).await?;

    Ok(Json(ApiResponse::success(products)))
}

/// Get a product by id
#[utoipa::path(
    get,
    path = "/api/products/:id",
    params(("id" = String, Path, description = "Product ID (UUID)")),
    responses(
        (status = 200, description = "Product returned", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Not found")
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "product")?;
    let product = state
        .services
        .products
        .get_product(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

    Ok(Json(ApiResponse::success(product)))
}

/// Create a product (admin only)
#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "SKU already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.create_product(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

/// Update a product (admin only)
#[utoipa::path(
    put,
    path = "/api/products/:id",
    params(("id" = String, Path, description = "Product ID (UUID)")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 409, description = "SKU rename collides")
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "product")?;
    let product = state.services.products.update_product(id, payload).await?;

    Ok(Json(ApiResponse::success(product)))
}

/// Delete a product (admin only)
#[utoipa::path(
    delete,
    path = "/api/products/:id",
    params(("id" = String, Path, description = "Product ID (UUID)")),
    responses(
        (status = 200, description = "Product deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "product")?;
    state.services.products.delete_product(id).await?;

    Ok(Json(ApiResponse::<()>::ok()))
}
