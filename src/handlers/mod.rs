pub mod auth;
pub mod health;
pub mod imports;
pub mod orders;
pub mod products;
pub mod stats;
pub mod users;

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::imports::ImportService;
use crate::services::orders::OrderService;
use crate::services::products::ProductService;
use crate::services::users::UserService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub products: Arc<ProductService>,
    pub users: Arc<UserService>,
    pub imports: Arc<ImportService>,
    pub auth: Arc<crate::auth::AuthService>,
}

impl AppServices {
    /// Build the service container shared by every handler.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<crate::auth::AuthService>,
        tax_rate: Decimal,
    ) -> Self {
        let products = ProductService::new(db_pool.clone(), Some(event_sender.clone()));
        let imports = ImportService::new(
            db_pool.clone(),
            products.clone(),
            Some(event_sender.clone()),
        );

        Self {
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                tax_rate,
                Some(event_sender.clone()),
            )),
            products: Arc::new(products),
            users: Arc::new(UserService::new(db_pool, Some(event_sender))),
            imports: Arc::new(imports),
            auth: auth_service,
        }
    }
}

/// Parses a path segment as a UUID so malformed ids come back as a 400
/// inside the standard envelope instead of the router's bare rejection.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::InvalidInput(format!("Invalid {} id", what)))
}
