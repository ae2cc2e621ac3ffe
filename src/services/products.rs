use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::DbPool;
use crate::entities::product::{self, Entity as Product};
use crate::errors::{is_unique_violation, ServiceError};
use crate::events::{Event, EventSender};
use crate::ids::new_entity_id;

fn validate_positive_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must be positive".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 50, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub name: String,
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[validate(custom = "validate_positive_price")]
    pub price: Decimal,
    #[validate(length(max = 50, message = "Color must be at most 50 characters"))]
    pub color: Option<String>,
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 50, message = "SKU is required"))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub name: Option<String>,
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[validate(custom = "validate_positive_price")]
    pub price: Option<Decimal>,
    #[validate(length(max = 50, message = "Color must be at most 50 characters"))]
    pub color: Option<String>,
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: Uuid,
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
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: u64,
}

#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let existing = Product::find()
            .filter(product::Column::Sku.eq(request.sku.as_str()))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, sku = %request.sku, "failed to check for existing SKU");
                ServiceError::DatabaseError(e)
            })?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product with SKU {} already exists",
                request.sku
            )));
        }

        let now = Utc::now();
        let model = product::Model {
            id: new_entity_id(),
            sku: request.sku,
            name: request.name,
            description: request.description,
            price: request.price,
            color: request.color,
            image_url: request.image_url,
            is_active: request.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };

        let saved = match model.clone().into_active_model().insert(db).await {
            Ok(saved) => saved,
            // Backstop for a concurrent create with the same SKU.
            Err(e) if is_unique_violation(&e) => {
                return Err(ServiceError::Conflict(format!(
                    "Product with SKU {} already exists",
                    model.sku
                )));
            }
            Err(e) => {
                error!(error = %e, sku = %model.sku, "failed to insert product");
                return Err(ServiceError::DatabaseError(e));
            }
        };

        info!(product_id = %saved.id, sku = %saved.sku, "product created");
        if let Some(event_sender) = &self.event_sender {
            event_sender
                .send_or_log(Event::ProductCreated(saved.id))
                .await;
        }

        Ok(Self::model_to_response(saved))
    }

    #[instrument(skip(self))]
    pub async fn get_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<ProductResponse>, ServiceError> {
        let db = &*self.db_pool;

        let product_model = Product::find_by_id(product_id).one(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "failed to fetch product");
            ServiceError::DatabaseError(e)
        })?;

        Ok(product_model.map(Self::model_to_response))
    }

    /// Exact SKU lookup. Inactive products still resolve here so existing
    /// carts keep pricing against them.
    #[instrument(skip(self))]
    pub async fn get_product_by_sku(
        &self,
        sku: &str,
    ) -> Result<Option<ProductResponse>, ServiceError> {
        let db = &*self.db_pool;

        let product_model = Product::find()
            .filter(product::Column::Sku.eq(sku))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, sku = %sku, "failed to fetch product by SKU");
                ServiceError::DatabaseError(e)
            })?;

        Ok(product_model.map(Self::model_to_response))
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        limit: u64,
        offset: u64,
        active_only: bool,
    ) -> Result<ProductListResponse, ServiceError> {
        let db = &*self.db_pool;

        let mut condition = Condition::all();
        if active_only {
            condition = condition.add(product::Column::IsActive.eq(true));
        }

        let total = Product::find()
            .filter(condition.clone())
            .count(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to count products");
                ServiceError::DatabaseError(e)
            })?;

        let products = Product::find()
            .filter(condition)
            .order_by_asc(product::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to list products");
                ServiceError::DatabaseError(e)
            })?;

        Ok(ProductListResponse {
            products: products.into_iter().map(Self::model_to_response).collect(),
            total,
        })
    }

    /// Substring SKU search over active products, for cashier lookups.
    #[instrument(skip(self))]
    pub async fn search_products(
        &self,
        sku_fragment: &str,
    ) -> Result<Vec<ProductResponse>, ServiceError> {
        let db = &*self.db_pool;

        let products = Product::find()
            .filter(product::Column::Sku.contains(sku_fragment))
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Sku)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to search products");
                ServiceError::DatabaseError(e)
            })?;

        Ok(products.into_iter().map(Self::model_to_response).collect())
    }

    /// Partial update. Absent fields keep their stored values; a SKU change
    /// must not collide with another product.
    #[instrument(skip(self, request))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let Some(existing) = Product::find_by_id(product_id).one(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "failed to fetch product");
            ServiceError::DatabaseError(e)
        })?
        else {
            return Err(ServiceError::NotFound(format!(
                "Product with id {} not found",
                product_id
            )));
        };

        if let Some(new_sku) = request.sku.as_deref() {
            if new_sku != existing.sku {
                let clash = Product::find()
                    .filter(product::Column::Sku.eq(new_sku))
                    .filter(product::Column::Id.ne(product_id))
                    .one(db)
                    .await
                    .map_err(|e| {
                        error!(error = %e, sku = %new_sku, "failed to check for SKU clash");
                        ServiceError::DatabaseError(e)
                    })?;
                if clash.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "Product with SKU {} already exists",
                        new_sku
                    )));
                }
            }
        }

        let mut active = existing.into_active_model();
        if let Some(sku) = request.sku {
            active.sku = Set(sku);
        }
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(color) = request.color {
            active.color = Set(Some(color));
        }
        if let Some(image_url) = request.image_url {
            active.image_url = Set(Some(image_url));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "failed to update product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "product updated");
        if let Some(event_sender) = &self.event_sender {
            event_sender
                .send_or_log(Event::ProductUpdated(product_id))
                .await;
        }

        Ok(Self::model_to_response(updated))
    }

    /// Hard delete. Past order lines keep their denormalized product copy.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let existing = Product::find_by_id(product_id).one(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "failed to fetch product");
            ServiceError::DatabaseError(e)
        })?;
        if existing.is_none() {
            return Err(ServiceError::NotFound(format!(
                "Product with id {} not found",
                product_id
            )));
        }

        Product::delete_by_id(product_id).exec(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "failed to delete product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "product deleted");
        if let Some(event_sender) = &self.event_sender {
            event_sender
                .send_or_log(Event::ProductDeleted(product_id))
                .await;
        }

        Ok(())
    }

    fn model_to_response(model: product::Model) -> ProductResponse {
        ProductResponse {
            id: model.id,
            sku: model.sku,
            name: model.name,
            description: model.description,
            price: model.price,
            color: model.color,
            image_url: model.image_url,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
