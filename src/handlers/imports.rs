//! CSV bulk import endpoint. Expects a multipart form with the file
//! under the `file` field; everything else is handled row by row in
//! [`crate::services::imports`].

use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::imports::ImportResultResponse;
use crate::{ApiResponse, AppState};

const UPLOAD_FIELD: &str = "file";

/// Import products from a CSV upload (admin only)
#[utoipa::path(
    post,
    path = "/api/import/csv",
    request_body(content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Import report, including per-row errors", body = ApiResponse<ImportResultResponse>),
        (status = 400, description = "Missing file or empty CSV"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "import"
)]
pub async fn import_csv(
    State(state): State<AppState>,
    auth_user: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut upload: Option<(String, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidInput(format!("Invalid multipart payload: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::InvalidInput(format!("Failed to read upload: {}", e)))?;

        upload = Some((filename, String::from_utf8_lossy(&bytes).into_owned()));
    }

    let (filename, content) = upload
        .ok_or_else(|| ServiceError::ValidationError("File is required".to_string()))?;

    let report = state
        .services
        .imports
        .import_products_csv(auth_user.id, &filename, &content)
        .await?;

    Ok(Json(ApiResponse::success(report)))
}
