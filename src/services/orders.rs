/*!
 * Order intake and fulfillment.
 *
 * The pricing path is deliberately strict: carts are priced against live
 * catalog rows at creation time, totals are computed once with banker-free
 * half-away-from-zero rounding, and the order plus its line items are
 * persisted in a single transaction keyed by a unique human-facing code.
 */

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as Order, OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::entities::product::{self, Entity as Product};
use crate::errors::{is_unique_violation, ServiceError};
use crate::events::{Event, EventSender};
use crate::ids::{generate_order_code, new_entity_id};

/// How many fresh codes to try before giving up on a unique order code.
const MAX_CODE_ATTEMPTS: u32 = 5;

/// Computes `(tax, total)` for a subtotal. Tax is rounded to two decimal
/// places half-away-from-zero; the total is the exact sum of the two.
pub fn compute_order_totals(subtotal: Decimal, tax_rate: Decimal) -> (Decimal, Decimal) {
    let tax = (subtotal * tax_rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let total = subtotal + tax;
    (tax, total)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItemInput {
    /// Accepted for wire compatibility; line items are resolved by SKU.
    pub product_id: Option<String>,
    #[validate(length(min = 1, message = "SKU is required"))]
    pub sku: String,
    #[validate(range(min = 1, message = "Quantity must be greater than 0"))]
    pub quantity: i32,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must have at least one item"))]
    pub items: Vec<CreateOrderItemInput>,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

/// Filter for order listings. Dates bound `created_at` inclusively.
#[derive(Debug, Clone, Default)]
pub struct OrderListFilter {
    pub limit: u64,
    pub offset: u64,
    pub status: Option<OrderStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub code: String,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItemResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatsResponse {
    pub total_orders: u64,
    pub completed_orders: u64,
    pub pending_orders: u64,
    pub total_revenue: Decimal,
    pub average_order_value: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopProductResponse {
    pub sku: String,
    pub name: String,
    pub total_quantity: i64,
    pub order_count: i64,
    pub total_revenue: Decimal,
}

#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    tax_rate: Decimal,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        tax_rate: Decimal,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            tax_rate,
            event_sender,
        }
    }

    /// Prices a cart against the catalog and persists the order with its line
    /// items atomically. Returns the order as stored, line items included.
    #[instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let mut subtotal = Decimal::ZERO;
        let mut resolved = Vec::with_capacity(request.items.len());
        for item in &request.items {
            item.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

            let product = Product::find()
                .filter(product::Column::Sku.eq(item.sku.as_str()))
                .one(db)
                .await
                .map_err(|e| {
                    error!(error = %e, sku = %item.sku, "failed to look up product");
                    ServiceError::DatabaseError(e)
                })?
                .ok_or_else(|| {
                    ServiceError::InvalidInput(format!("Product with SKU {} not found", item.sku))
                })?;

            subtotal += product.price * Decimal::from(item.quantity);
            resolved.push((product, item.quantity, item.color.clone()));
        }

        let (tax, total) = compute_order_totals(subtotal, self.tax_rate);
        let order_id = new_entity_id();
        let now = Utc::now();

        let item_models: Vec<order_item::Model> = resolved
            .into_iter()
            .map(|(product, quantity, color)| order_item::Model {
                id: new_entity_id(),
                order_id,
                product_id: product.id,
                sku: product.sku,
                name: product.name,
                quantity,
                unit_price: product.price,
                color,
                created_at: now,
            })
            .collect();

        // The code column carries a unique index; on a collision we roll the
        // transaction back and retry with a fresh code.
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let order_model = order::Model {
                id: order_id,
                code: generate_order_code(),
                status: OrderStatus::Pending,
                subtotal,
                tax,
                total,
                payment_method: None,
                payment_status: PaymentStatus::Unpaid,
                notes: request.notes.clone(),
                created_at: now,
                updated_at: now,
                completed_at: None,
            };
            let item_actives: Vec<order_item::ActiveModel> = item_models
                .iter()
                .cloned()
                .map(IntoActiveModel::into_active_model)
                .collect();

            match self
                .insert_order(db, order_model.clone().into_active_model(), item_actives)
                .await
            {
                Ok(()) => {
                    info!(
                        order_id = %order_id,
                        code = %order_model.code,
                        total = %order_model.total,
                        "order created"
                    );
                    if let Some(event_sender) = &self.event_sender {
                        event_sender.send_or_log(Event::OrderCreated(order_id)).await;
                    }
                    return Ok(Self::order_to_response(order_model, item_models));
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, "order code collision, retrying with a fresh code");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, order_id = %order_id, "failed to persist order");
                    return Err(ServiceError::DatabaseError(e));
                }
            }
        }

        error!(
            order_id = %order_id,
            "exhausted {} order code attempts",
            MAX_CODE_ATTEMPTS
        );
        Err(ServiceError::Conflict(
            "Could not allocate a unique order code".to_string(),
        ))
    }

    async fn insert_order(
        &self,
        db: &DatabaseConnection,
        header: order::ActiveModel,
        items: Vec<order_item::ActiveModel>,
    ) -> Result<(), DbErr> {
        let txn = db.begin().await?;
        header.insert(&txn).await?;
        OrderItem::insert_many(items).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let Some(order_model) = Order::find_by_id(order_id).one(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to fetch order");
            ServiceError::DatabaseError(e)
        })?
        else {
            return Ok(None);
        };

        let items = self.load_items(db, order_model.id).await?;
        Ok(Some(Self::order_to_response(order_model, items)))
    }

    /// Customer-facing lookup by the short order code.
    #[instrument(skip(self))]
    pub async fn get_order_by_code(
        &self,
        code: &str,
    ) -> Result<Option<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let Some(order_model) = Order::find()
            .filter(order::Column::Code.eq(code))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, code = %code, "failed to fetch order by code");
                ServiceError::DatabaseError(e)
            })?
        else {
            return Ok(None);
        };

        let items = self.load_items(db, order_model.id).await?;
        Ok(Some(Self::order_to_response(order_model, items)))
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, offset = filter.offset))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;

        let mut condition = Condition::all();
        if let Some(status) = filter.status {
            condition = condition.add(order::Column::Status.eq(status));
        }
        if let Some(start) = filter.start_date {
            condition = condition.add(order::Column::CreatedAt.gte(start));
        }
        if let Some(end) = filter.end_date {
            condition = condition.add(order::Column::CreatedAt.lte(end));
        }

        let total = Order::find()
            .filter(condition.clone())
            .count(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to count orders");
                ServiceError::DatabaseError(e)
            })?;

        let orders = Order::find()
            .filter(condition)
            .order_by_desc(order::Column::CreatedAt)
            .limit(filter.limit)
            .offset(filter.offset)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to list orders");
                ServiceError::DatabaseError(e)
            })?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        if !order_ids.is_empty() {
            let items = OrderItem::find()
                .filter(order_item::Column::OrderId.is_in(order_ids))
                .order_by_asc(order_item::Column::CreatedAt)
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "failed to load order items");
                    ServiceError::DatabaseError(e)
                })?;
            for item in items {
                items_by_order.entry(item.order_id).or_default().push(item);
            }
        }

        let orders = orders
            .into_iter()
            .map(|o| {
                let items = items_by_order.remove(&o.id).unwrap_or_default();
                Self::order_to_response(o, items)
            })
            .collect();

        Ok(OrderListResponse { orders, total })
    }

    /// Moves an order to a new status. Entering `Completed` stamps
    /// `completed_at`; non-empty notes replace the stored notes, empty or
    /// absent notes leave them untouched.
    #[instrument(skip(self, notes), fields(status = %status))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        notes: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let Some(existing) = Order::find_by_id(order_id).one(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to fetch order");
            ServiceError::DatabaseError(e)
        })?
        else {
            return Err(ServiceError::NotFound(format!(
                "Order with id {} not found",
                order_id
            )));
        };

        let old_status = existing.status;
        let now = Utc::now();

        let mut active = existing.into_active_model();
        active.status = Set(status);
        active.updated_at = Set(now);
        if status == OrderStatus::Completed {
            active.completed_at = Set(Some(now));
        }
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            active.notes = Set(Some(notes));
        }

        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to update order status");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %status,
            "order status updated"
        );
        if let Some(event_sender) = &self.event_sender {
            event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: old_status.to_string(),
                    new_status: status.to_string(),
                })
                .await;
        }

        let items = self.load_items(db, updated.id).await?;
        Ok(Self::order_to_response(updated, items))
    }

    /// Cashier checkout: marks the order completed and paid in one step.
    #[instrument(skip(self, notes), fields(payment_method = %payment_method))]
    pub async fn complete_order(
        &self,
        order_id: Uuid,
        payment_method: PaymentMethod,
        notes: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let Some(existing) = Order::find_by_id(order_id).one(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to fetch order");
            ServiceError::DatabaseError(e)
        })?
        else {
            return Err(ServiceError::NotFound(format!(
                "Order with id {} not found",
                order_id
            )));
        };

        let now = Utc::now();
        let mut active = existing.into_active_model();
        active.status = Set(OrderStatus::Completed);
        active.payment_status = Set(PaymentStatus::Paid);
        active.payment_method = Set(Some(payment_method));
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            active.notes = Set(Some(notes));
        }

        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to complete order");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            code = %updated.code,
            payment_method = %payment_method,
            "order completed"
        );
        if let Some(event_sender) = &self.event_sender {
            event_sender.send_or_log(Event::OrderCompleted(order_id)).await;
        }

        let items = self.load_items(db, updated.id).await?;
        Ok(Self::order_to_response(updated, items))
    }

    /// Adjusts payment fields without touching the order status.
    #[instrument(skip(self), fields(payment_method = %payment_method, payment_status = %payment_status))]
    pub async fn update_order_payment(
        &self,
        order_id: Uuid,
        payment_method: PaymentMethod,
        payment_status: PaymentStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let Some(existing) = Order::find_by_id(order_id).one(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to fetch order");
            ServiceError::DatabaseError(e)
        })?
        else {
            return Err(ServiceError::NotFound(format!(
                "Order with id {} not found",
                order_id
            )));
        };

        let mut active = existing.into_active_model();
        active.payment_method = Set(Some(payment_method));
        active.payment_status = Set(payment_status);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to update order payment");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            payment_status = %payment_status,
            "order payment updated"
        );
        if let Some(event_sender) = &self.event_sender {
            event_sender
                .send_or_log(Event::OrderPaymentUpdated(order_id))
                .await;
        }

        let items = self.load_items(db, updated.id).await?;
        Ok(Self::order_to_response(updated, items))
    }

    /// Order counts plus revenue over completed orders. The average is
    /// revenue divided by completed count, rounded to two decimal places.
    #[instrument(skip(self))]
    pub async fn get_order_stats(&self) -> Result<OrderStatsResponse, ServiceError> {
        let db = &*self.db_pool;

        let total_orders = Order::find().count(db).await.map_err(|e| {
            error!(error = %e, "failed to count orders");
            ServiceError::DatabaseError(e)
        })?;
        let completed_orders = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .count(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to count completed orders");
                ServiceError::DatabaseError(e)
            })?;
        let pending_orders = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .count(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to count pending orders");
                ServiceError::DatabaseError(e)
            })?;

        let revenue: Option<Option<Decimal>> = Order::find()
            .select_only()
            .column_as(Func::sum(Expr::col(order::Column::Total)), "revenue")
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .into_tuple()
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to sum revenue");
                ServiceError::DatabaseError(e)
            })?;
        let total_revenue = revenue.flatten().unwrap_or(Decimal::ZERO);

        let average_order_value = if completed_orders > 0 {
            (total_revenue / Decimal::from(completed_orders))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        } else {
            Decimal::ZERO
        };

        Ok(OrderStatsResponse {
            total_orders,
            completed_orders,
            pending_orders,
            total_revenue,
            average_order_value,
        })
    }

    /// Top sellers by unit volume across completed orders, grouped by SKU so
    /// renamed products aggregate under one row.
    #[instrument(skip(self))]
    pub async fn get_top_products(
        &self,
        limit: u64,
    ) -> Result<Vec<TopProductResponse>, ServiceError> {
        let db = &*self.db_pool;

        let rows: Vec<(String, Option<String>, Option<i64>, i64, Option<Decimal>)> =
            OrderItem::find()
                .select_only()
                .column(order_item::Column::Sku)
                .column_as(Func::max(Expr::col(order_item::Column::Name)), "name")
                .column_as(
                    Func::sum(Expr::col(order_item::Column::Quantity)),
                    "total_quantity",
                )
                .column_as(
                    Func::count_distinct(Expr::col((
                        order_item::Entity,
                        order_item::Column::OrderId,
                    ))),
                    "order_count",
                )
                .column_as(
                    Func::sum(
                        Expr::col(order_item::Column::Quantity)
                            .mul(Expr::col(order_item::Column::UnitPrice)),
                    ),
                    "total_revenue",
                )
                .join(JoinType::InnerJoin, order_item::Relation::Order.def())
                .filter(order::Column::Status.eq(OrderStatus::Completed))
                .group_by(order_item::Column::Sku)
                .order_by_desc(Expr::col(order_item::Column::Quantity).sum())
                .limit(limit)
                .into_tuple()
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "failed to aggregate top products");
                    ServiceError::DatabaseError(e)
                })?;

        Ok(rows
            .into_iter()
            .map(
                |(sku, name, total_quantity, order_count, total_revenue)| TopProductResponse {
                    name: name.unwrap_or_else(|| sku.clone()),
                    sku,
                    total_quantity: total_quantity.unwrap_or(0),
                    order_count,
                    total_revenue: total_revenue.unwrap_or(Decimal::ZERO),
                },
            )
            .collect())
    }

    async fn load_items(
        &self,
        db: &DatabaseConnection,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "failed to load order items");
                ServiceError::DatabaseError(e)
            })
    }

    fn order_to_response(model: order::Model, items: Vec<order_item::Model>) -> OrderResponse {
        OrderResponse {
            id: model.id,
            code: model.code,
            status: model.status,
            subtotal: model.subtotal,
            tax: model.tax,
            total: model.total,
            payment_method: model.payment_method,
            payment_status: model.payment_status,
            items: items.into_iter().map(Self::item_to_response).collect(),
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
            completed_at: model.completed_at,
        }
    }

    fn item_to_response(model: order_item::Model) -> OrderItemResponse {
        OrderItemResponse {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            sku: model.sku,
            name: model.name,
            quantity: model.quantity,
            unit_price: model.unit_price,
            color: model.color,
            created_at: model.created_at,
        }
    }
}
