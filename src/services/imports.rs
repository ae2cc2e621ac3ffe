/*!
 * Bulk catalog import from CSV uploads.
 *
 * Parsing is deliberately forgiving about column order: the header row is
 * matched case-insensitively and rows are validated independently, so one bad
 * row never aborts the batch. Every run leaves an audit record behind.
 */

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde::Serialize;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::import_run;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ids::new_entity_id;
use crate::services::products::{
    CreateProductRequest, ProductService, UpdateProductRequest,
};

/// How many row errors are kept, both in the response and the audit record.
const MAX_REPORTED_ERRORS: usize = 10;

/// One successfully imported row, echoed back in the import report.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportedProduct {
    pub sku: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResultResponse {
    pub import_id: Uuid,
    pub filename: String,
    pub total_rows: usize,
    pub successful_rows: usize,
    pub failed_rows: usize,
    /// First errors only; the full count is in `failed_rows`.
    pub errors: Vec<String>,
    pub imported_products: Vec<ImportedProduct>,
}

/// A raw CSV row after header mapping. `None` means the column was absent;
/// an empty string means the column was present with no value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CsvRow {
    sku: Option<String>,
    name: Option<String>,
    description: Option<String>,
    price: Option<String>,
    color: Option<String>,
    image_url: Option<String>,
}

/// A row that passed validation.
#[derive(Debug, Clone, PartialEq)]
struct ValidRow {
    sku: String,
    name: String,
    description: Option<String>,
    price: Decimal,
    color: Option<String>,
    image_url: Option<String>,
}

fn parse_row(headers: &[String], line: &str) -> CsvRow {
    let values: Vec<&str> = line.split(',').map(str::trim).collect();
    let field = |name: &str| -> Option<String> {
        headers
            .iter()
            .position(|h| h == name)
            .map(|idx| values.get(idx).copied().unwrap_or("").to_string())
    };

    CsvRow {
        sku: field("sku"),
        name: field("name"),
        description: field("description"),
        price: field("price"),
        color: field("color"),
        image_url: field("image_url"),
    }
}

fn validate_row(row: CsvRow) -> Result<ValidRow, Vec<String>> {
    let mut problems = Vec::new();

    let sku = row.sku.unwrap_or_default();
    if sku.is_empty() {
        problems.push("SKU is required".to_string());
    }

    let name = row.name.unwrap_or_default();
    if name.is_empty() {
        problems.push("Name is required".to_string());
    }

    let price = match row.price.as_deref() {
        Some(raw) => match Decimal::from_str(raw) {
            Ok(price) if price > Decimal::ZERO => Some(price),
            _ => {
                problems.push("Price must be a positive number".to_string());
                None
            }
        },
        None => {
            problems.push("Price must be a positive number".to_string());
            None
        }
    };

    // A present-but-empty image_url cell is rejected, same as any other
    // malformed URL.
    if let Some(url) = row.image_url.as_deref() {
        if !validator::validate_url(url) {
            problems.push("Image URL must be a valid URL".to_string());
        }
    }

    if !problems.is_empty() {
        return Err(problems);
    }

    Ok(ValidRow {
        sku,
        name,
        description: row.description,
        price: price.unwrap_or_default(),
        color: row.color,
        image_url: row.image_url,
    })
}

#[derive(Clone)]
pub struct ImportService {
    db_pool: Arc<DbPool>,
    product_service: ProductService,
    event_sender: Option<Arc<EventSender>>,
}

impl ImportService {
    pub fn new(
        db_pool: Arc<DbPool>,
        product_service: ProductService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            product_service,
            event_sender,
        }
    }

    /// Imports a product CSV: one upsert per row keyed by SKU, with per-row
    /// errors collected instead of failing the whole file.
    #[instrument(skip(self, content), fields(filename = %filename, user_id = %user_id))]
    pub async fn import_products_csv(
        &self,
        user_id: Uuid,
        filename: &str,
        content: &str,
    ) -> Result<ImportResultResponse, ServiceError> {
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let Some(header_line) = lines.first() else {
            return Err(ServiceError::ValidationError("CSV file is empty".to_string()));
        };
        let headers: Vec<String> = header_line
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .collect();

        let total_rows = lines.len() - 1;
        let mut successful_rows = 0usize;
        let mut failed_rows = 0usize;
        let mut created = 0usize;
        let mut updated = 0usize;
        let mut errors: Vec<String> = Vec::new();
        let mut imported: Vec<ImportedProduct> = Vec::new();

        for (idx, line) in lines.iter().enumerate().skip(1) {
            let row_number = idx + 1;

            let row = match validate_row(parse_row(&headers, line)) {
                Ok(row) => row,
                Err(problems) => {
                    failed_rows += 1;
                    errors.push(format!("Row {}: {}", row_number, problems.join("; ")));
                    continue;
                }
            };

            match self.upsert_row(&row).await {
                Ok(was_update) => {
                    successful_rows += 1;
                    if was_update {
                        updated += 1;
                    } else {
                        created += 1;
                    }
                    imported.push(ImportedProduct {
                        sku: row.sku,
                        name: row.name,
                        description: row.description,
                        price: row.price,
                        color: row.color,
                        image_url: row.image_url,
                        is_active: true,
                    });
                }
                Err(e) => {
                    failed_rows += 1;
                    errors.push(format!("Row {}: {}", row_number, e));
                }
            }
        }

        errors.truncate(MAX_REPORTED_ERRORS);

        let import_id = new_entity_id();
        let errors_json =
            serde_json::to_string(&errors).unwrap_or_else(|_| "[]".to_string());
        let run = import_run::ActiveModel {
            id: Set(import_id),
            user_id: Set(user_id),
            filename: Set(filename.to_string()),
            total_rows: Set(total_rows as i32),
            successful_rows: Set(successful_rows as i32),
            failed_rows: Set(failed_rows as i32),
            errors: Set(Some(errors_json)),
            created_at: Set(Utc::now()),
        };
        run.insert(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, "failed to record import run");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            import_id = %import_id,
            filename = %filename,
            successful = successful_rows,
            failed = failed_rows,
            "CSV import completed"
        );
        if let Some(event_sender) = &self.event_sender {
            event_sender
                .send_or_log(Event::ProductsImported {
                    import_id,
                    created,
                    updated,
                    failed: failed_rows,
                })
                .await;
        }

        Ok(ImportResultResponse {
            import_id,
            filename: filename.to_string(),
            total_rows,
            successful_rows,
            failed_rows,
            errors,
            imported_products: imported,
        })
    }

    /// Returns `true` when an existing product was updated rather than created.
    async fn upsert_row(&self, row: &ValidRow) -> Result<bool, ServiceError> {
        let existing = self.product_service.get_product_by_sku(&row.sku).await?;

        match existing {
            Some(product) => {
                self.product_service
                    .update_product(
                        product.id,
                        UpdateProductRequest {
                            sku: None,
                            name: Some(row.name.clone()),
                            description: row.description.clone(),
                            price: Some(row.price),
                            color: row.color.clone(),
                            image_url: row.image_url.clone(),
                            is_active: Some(true),
                        },
                    )
                    .await?;
                Ok(true)
            }
            None => {
                self.product_service
                    .create_product(CreateProductRequest {
                        sku: row.sku.clone(),
                        name: row.name.clone(),
                        description: row.description.clone(),
                        price: row.price,
                        color: row.color.clone(),
                        image_url: row.image_url.clone(),
                        is_active: Some(true),
                    })
                    .await?;
                Ok(false)
            }
        }
    }
}
