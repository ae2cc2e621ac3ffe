//! OpenAPI document assembly and Swagger UI wiring.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "POS API",
        description = r#"
Point-of-sale backend: product catalog, order intake and fulfillment,
CSV catalog import, and sales statistics.

All successful responses share the envelope `{"success": true, "data": ...}`
with an optional `meta` pagination block; failures return
`{"success": false, "error": {"message": ...}}`.

Protected endpoints expect `Authorization: Bearer <jwt>`; tokens come from
`POST /api/auth/login`.
        "#,
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development")
    ),
    tags(
        (name = "health", description = "Liveness probe"),
        (name = "auth", description = "Login, registration, current user"),
        (name = "products", description = "Product catalog"),
        (name = "orders", description = "Order intake and fulfillment"),
        (name = "stats", description = "Sales reporting"),
        (name = "users", description = "User administration"),
        (name = "import", description = "CSV catalog import")
    ),
    paths(
        crate::handlers::health::health_check,

        crate::handlers::auth::login,
        crate::handlers::auth::register,
        crate::handlers::auth::me,

        crate::handlers::products::list_products,
        crate::handlers::products::search_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order_by_code,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::complete_order,

        crate::handlers::stats::order_stats,
        crate::handlers::stats::top_products,

        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,

        crate::handlers::imports::import_csv,
    ),
    components(
        schemas(
            crate::ErrorBody,
            crate::Meta,

            crate::handlers::health::HealthResponse,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::LoginResponse,
            crate::handlers::auth::AuthUserResponse,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::orders::CompleteOrderRequest,

            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::PaymentMethod,

            crate::services::orders::CreateOrderRequest,
            crate::services::orders::CreateOrderItemInput,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderStatsResponse,
            crate::services::orders::TopProductResponse,

            crate::services::products::CreateProductRequest,
            crate::services::products::UpdateProductRequest,
            crate::services::products::ProductResponse,

            crate::services::users::CreateUserRequest,
            crate::services::users::UpdateUserRequest,
            crate::services::users::UserResponse,

            crate::services::imports::ImportResultResponse,
            crate::services::imports::ImportedProduct,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Swagger UI router serving the rendered document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_includes_routes_and_security() {
        let openapi = ApiDoc::openapi();
        let json = serde_json::to_string(&openapi).unwrap();

        assert!(json.contains("/api/orders"));
        assert!(json.contains("/api/import/csv"));
        assert!(json.contains("bearer_auth"));
    }

    #[test]
    fn document_registers_envelope_schemas() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.expect("components present");

        assert!(components.schemas.contains_key("ErrorBody"));
        assert!(components.schemas.contains_key("OrderResponse"));
        assert!(components.schemas.contains_key("OrderStatus"));
    }
}
