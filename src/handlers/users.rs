//! User administration endpoints. Every route here sits behind the
//! admin role; self-service lives under `/api/auth`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::parse_id;
use crate::services::users::{CreateUserRequest, UpdateUserRequest, UserResponse};
use crate::{ApiJson, ApiQuery, ApiResponse, ListQuery, Meta};

use super::AppState;

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    params(
        ("page" = Option<u64>, Query, description = "1-based page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Page size, 1-100, default 20")
    ),
    responses(
        (status = 200, description = "Users with pagination meta", body = ApiResponse<Vec<UserResponse>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    query.validate()?;

    let result = state
        .services
        .users
        .list_users(query.limit, query.offset())
        .await?;

    Ok(Json(ApiResponse::success_with_meta(
        result.users,
        Meta {
            page: query.page,
            limit: query.limit,
            total: result.total,
        },
    )))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/api/users/:id",
    params(("id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "User returned", body = ApiResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "user")?;
    let user = state
        .services
        .users
        .get_user(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::success(user)))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.users.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

/// Update a user's email or display name
#[utoipa::path(
    put,
    path = "/api/users/:id",
    params(("id" = String, Path, description = "User ID (UUID)")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "user")?;
    let user = state.services.users.update_user(id, payload).await?;

    Ok(Json(ApiResponse::success(user)))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/api/users/:id",
    params(("id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id, "user")?;
    state.services.users.delete_user(id).await?;

    Ok(Json(ApiResponse::<()>::ok()))
}
