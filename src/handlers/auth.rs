//! Login, registration, and current-user endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::users::{CreateUserRequest, UserResponse, UserService};
use crate::{ApiJson, ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Registered email address
    #[validate(email(message = "Invalid email address"))]
    #[schema(example = "cashier@store.test")]
    pub email: String,
    /// Account password
    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "hunter2hunter2")]
    pub password: String,
}

/// User projection embedded in the login payload, trimmed to what a
/// client needs next to the token.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthUserResponse {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: AuthUserResponse,
    pub token: String,
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid email or password")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    // Same message whether the account is missing, has no credential,
    // or the password is wrong.
    let user = state
        .services
        .users
        .get_user_by_email(&payload.email)
        .await?
        .filter(|u| UserService::verify_user_password(u, &payload.password))
        .ok_or_else(|| ServiceError::InvalidInput("Invalid email or password".to_string()))?;

    let token = state
        .services
        .auth
        .generate_token(&user)
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;

    info!(user_id = %user.id, email = %user.email, "user login successful");

    Ok(Json(ApiResponse::success(LoginResponse {
        user: AuthUserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        },
        token,
    })))
}

/// Register a new user (admin only)
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.users.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

/// Current user from the presented token
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account no longer exists")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    // Fresh read rather than echoing claims: a deleted account holding a
    // still-valid token gets a 404 here.
    let user = state
        .services
        .users
        .get_user(auth_user.id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::success(user)))
}
