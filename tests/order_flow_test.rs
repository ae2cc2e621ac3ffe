//! Order intake, server-side pricing, checkout, and the sales statistics
//! built on top of completed orders.

mod common;

use axum::http::Method;
use common::{decimal_value, response_json, TestApp};
use pos_api::entities::order::{PaymentMethod, PaymentStatus};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn create_order(app: &TestApp, items: Value) -> Value {
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({ "items": items })),
            None,
        )
        .await;
    assert_eq!(response.status(), 201, "order creation should succeed");
    response_json(response).await
}

#[tokio::test]
async fn test_create_order_prices_server_side() {
    let app = TestApp::new().await;
    app.seed_product("ESP-1", "Espresso", dec!(2.50)).await;
    app.seed_product("LAT-1", "Latte", dec!(3.20)).await;

    // The client-supplied price is not part of the contract and must be
    // ignored; only the stored catalog price counts.
    let body = create_order(
        &app,
        json!([
            { "sku": "ESP-1", "quantity": 2, "price": "0.01" },
            { "sku": "LAT-1", "quantity": 1 }
        ]),
    )
    .await;

    assert_eq!(body["success"], json!(true));
    let order = &body["data"];
    assert_eq!(order["status"], json!("PENDING"));
    assert_eq!(order["paymentStatus"], json!("UNPAID"));
    assert!(order.get("paymentMethod").is_none());
    assert_eq!(decimal_value(&order["subtotal"]), dec!(8.20));
    assert_eq!(decimal_value(&order["tax"]), dec!(1.72));
    assert_eq!(decimal_value(&order["total"]), dec!(9.92));

    let items = order["items"].as_array().expect("items array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["sku"], json!("ESP-1"));
    assert_eq!(items[0]["name"], json!("Espresso"));
    assert_eq!(items[0]["quantity"], json!(2));
    assert_eq!(decimal_value(&items[0]["unitPrice"]), dec!(2.50));

    // The code is the public handle for the receipt.
    let code = order["code"].as_str().expect("order code");
    let response = app
        .request(Method::GET, &format!("/api/orders/code/{code}"), None, None)
        .await;
    assert_eq!(response.status(), 200);
    let fetched = response_json(response).await;
    assert_eq!(decimal_value(&fetched["data"]["total"]), dec!(9.92));
}

#[tokio::test]
async fn test_order_code_is_eight_uppercase_alphanumerics() {
    let app = TestApp::new().await;
    app.seed_product("CODE-1", "Code Check", dec!(1.00)).await;

    let body = create_order(&app, json!([{ "sku": "CODE-1", "quantity": 1 }])).await;
    let code = body["data"]["code"].as_str().expect("order code");

    assert_eq!(code.len(), 8);
    assert!(code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
}

#[tokio::test]
async fn test_tax_rounds_half_away_from_zero() {
    let app = TestApp::new().await;
    app.seed_product("COIN-1", "Rounding Probe", dec!(0.50)).await;

    // 0.50 * 0.21 = 0.105, a midpoint at two decimals.
    let body = create_order(&app, json!([{ "sku": "COIN-1", "quantity": 1 }])).await;
    assert_eq!(decimal_value(&body["data"]["tax"]), dec!(0.11));
    assert_eq!(decimal_value(&body["data"]["total"]), dec!(0.61));
}

#[tokio::test]
async fn test_unknown_sku_fails_without_persisting() {
    let app = TestApp::new().await;
    app.seed_product("REAL-1", "Real Product", dec!(5.00)).await;

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({ "items": [
                { "sku": "REAL-1", "quantity": 1 },
                { "sku": "GHOST-1", "quantity": 1 }
            ]})),
            None,
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(
        body["error"]["message"],
        json!("Product with SKU GHOST-1 not found")
    );

    let response = app.request_as_cashier(Method::GET, "/api/orders", None).await;
    let body = response_json(response).await;
    assert_eq!(body["meta"]["total"], json!(0), "no partial order persisted");
}

#[tokio::test]
async fn test_create_order_validates_items() {
    let app = TestApp::new().await;
    app.seed_product("VAL-1", "Validated", dec!(5.00)).await;

    let response = app
        .request(Method::POST, "/api/orders", Some(json!({ "items": [] })), None)
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap_or_default()
            .contains("Order must have at least one item"),
        "unexpected message: {}",
        body["error"]["message"]
    );

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({ "items": [{ "sku": "VAL-1", "quantity": 0 }] })),
            None,
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap_or_default()
            .contains("Quantity must be greater than 0"),
        "unexpected message: {}",
        body["error"]["message"]
    );
}

#[tokio::test]
async fn test_order_lookup_auth_boundaries() {
    let app = TestApp::new().await;
    app.seed_product("LOOK-1", "Lookup", dec!(5.00)).await;
    let body = create_order(&app, json!([{ "sku": "LOOK-1", "quantity": 1 }])).await;
    let id = body["data"]["id"].as_str().expect("order id").to_string();

    // By id is staff-only; by code is the public receipt lookup.
    let response = app
        .request(Method::GET, &format!("/api/orders/{id}"), None, None)
        .await;
    assert_eq!(response.status(), 401);

    let response = app
        .request_as_cashier(Method::GET, &format!("/api/orders/{id}"), None)
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .request_as_cashier(Method::GET, "/api/orders/not-a-uuid", None)
        .await;
    assert_eq!(response.status(), 400);
    let parsed = response_json(response).await;
    assert_eq!(parsed["error"]["message"], json!("Invalid order id"));

    let response = app
        .request_as_cashier(
            Method::GET,
            &format!("/api/orders/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
    let parsed = response_json(response).await;
    assert_eq!(parsed["error"]["message"], json!("Order not found"));

    let response = app
        .request(Method::GET, "/api/orders/code/ZZZZZZZZ", None, None)
        .await;
    assert_eq!(response.status(), 404);
    let parsed = response_json(response).await;
    assert_eq!(parsed["error"]["message"], json!("Order not found"));
}

#[tokio::test]
async fn test_price_snapshot_survives_product_update() {
    let app = TestApp::new().await;
    let product = app.seed_product("SNAP-1", "Snapshot", dec!(4.00)).await;

    let body = create_order(&app, json!([{ "sku": "SNAP-1", "quantity": 3 }])).await;
    let id = body["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .request_as_admin(
            Method::PUT,
            &format!("/api/products/{}", product.id),
            Some(json!({ "price": "9.00" })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .request_as_cashier(Method::GET, &format!("/api/orders/{id}"), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(
        decimal_value(&body["data"]["items"][0]["unitPrice"]),
        dec!(4.00)
    );
    assert_eq!(decimal_value(&body["data"]["subtotal"]), dec!(12.00));

    // New orders pick up the new price.
    let body = create_order(&app, json!([{ "sku": "SNAP-1", "quantity": 1 }])).await;
    assert_eq!(decimal_value(&body["data"]["subtotal"]), dec!(9.00));
}

#[tokio::test]
async fn test_update_order_status() {
    let app = TestApp::new().await;
    app.seed_product("STAT-1", "Status Probe", dec!(5.00)).await;
    let body = create_order(&app, json!([{ "sku": "STAT-1", "quantity": 1 }])).await;
    let id = body["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .request_as_cashier(
            Method::PATCH,
            &format!("/api/orders/{id}/status"),
            Some(json!({ "status": "PROCESSING", "notes": "packing" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("PROCESSING"));
    assert_eq!(body["data"]["notes"], json!("packing"));

    // Empty notes leave the stored notes alone.
    let response = app
        .request_as_cashier(
            Method::PATCH,
            &format!("/api/orders/{id}/status"),
            Some(json!({ "status": "CANCELLED", "notes": "" })),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("CANCELLED"));
    assert_eq!(body["data"]["notes"], json!("packing"));

    let response = app
        .request_as_cashier(
            Method::PATCH,
            &format!("/api/orders/{id}/status"),
            Some(json!({ "status": "SHIPPED" })),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(
        body["error"]["message"],
        json!("Invalid order status: SHIPPED")
    );

    let missing = uuid::Uuid::new_v4();
    let response = app
        .request_as_cashier(
            Method::PATCH,
            &format!("/api/orders/{missing}/status"),
            Some(json!({ "status": "PROCESSING" })),
        )
        .await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(
        body["error"]["message"],
        json!(format!("Order with id {} not found", missing))
    );
}

#[tokio::test]
async fn test_complete_order_marks_paid() {
    let app = TestApp::new().await;
    app.seed_product("PAY-1", "Payable", dec!(10.00)).await;
    let body = create_order(&app, json!([{ "sku": "PAY-1", "quantity": 1 }])).await;
    let id = body["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{id}/complete"),
            Some(json!({ "paymentMethod": "CARD", "paymentStatus": "UNPAID" })),
            None,
        )
        .await;
    assert_eq!(response.status(), 401, "checkout requires a logged-in user");

    let response = app
        .request_as_cashier(
            Method::POST,
            &format!("/api/orders/{id}/complete"),
            // A contradictory paymentStatus is accepted on the wire but
            // completion always records the order as paid.
            Some(json!({ "paymentMethod": "CARD", "paymentStatus": "UNPAID" })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("COMPLETED"));
    assert_eq!(body["data"]["paymentStatus"], json!("PAID"));
    assert_eq!(body["data"]["paymentMethod"], json!("CARD"));
    assert!(body["data"]["completedAt"].is_string());
}

#[tokio::test]
async fn test_complete_order_validates_payment_method() {
    let app = TestApp::new().await;
    app.seed_product("PAY-2", "Payable", dec!(10.00)).await;
    let body = create_order(&app, json!([{ "sku": "PAY-2", "quantity": 1 }])).await;
    let id = body["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .request_as_cashier(
            Method::POST,
            &format!("/api/orders/{id}/complete"),
            Some(json!({ "paymentMethod": "BITCOIN" })),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(
        body["error"]["message"],
        json!("Invalid payment method: BITCOIN")
    );
}

#[tokio::test]
async fn test_list_orders_filters_and_paginates() {
    let app = TestApp::new().await;
    app.seed_product("LST-1", "Listed", dec!(5.00)).await;

    let first = create_order(&app, json!([{ "sku": "LST-1", "quantity": 1 }])).await;
    let second = create_order(&app, json!([{ "sku": "LST-1", "quantity": 2 }])).await;
    let third = create_order(&app, json!([{ "sku": "LST-1", "quantity": 3 }])).await;
    let first_id = first["data"]["id"].as_str().expect("order id").to_string();

    let response = app
        .request_as_cashier(
            Method::POST,
            &format!("/api/orders/{first_id}/complete"),
            Some(json!({ "paymentMethod": "CASH" })),
        )
        .await;
    assert_eq!(response.status(), 200);

    // Newest first.
    let response = app.request_as_cashier(Method::GET, "/api/orders", None).await;
    let body = response_json(response).await;
    assert_eq!(body["meta"]["total"], json!(3));
    assert_eq!(body["data"][0]["code"], third["data"]["code"]);
    assert_eq!(body["data"][1]["code"], second["data"]["code"]);
    assert_eq!(body["data"][2]["code"], first["data"]["code"]);

    let response = app
        .request_as_cashier(Method::GET, "/api/orders?status=COMPLETED", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["meta"]["total"], json!(1));
    assert_eq!(body["data"][0]["code"], first["data"]["code"]);

    let response = app
        .request_as_cashier(Method::GET, "/api/orders?status=PENDING", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["meta"]["total"], json!(2));

    let response = app
        .request_as_cashier(Method::GET, "/api/orders?page=2&limit=2", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["meta"]["total"], json!(3));
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["code"], first["data"]["code"]);

    let response = app
        .request_as_cashier(Method::GET, "/api/orders?status=BOGUS", None)
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["error"]["message"], json!("Invalid order status: BOGUS"));
}

#[tokio::test]
async fn test_list_orders_date_window() {
    let app = TestApp::new().await;
    app.seed_product("DATE-1", "Dated", dec!(5.00)).await;
    create_order(&app, json!([{ "sku": "DATE-1", "quantity": 1 }])).await;

    let response = app
        .request_as_cashier(
            Method::GET,
            "/api/orders?startDate=2099-01-01T00:00:00Z",
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["meta"]["total"], json!(0));

    let response = app
        .request_as_cashier(
            Method::GET,
            "/api/orders?endDate=2099-01-01T00:00:00Z",
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["meta"]["total"], json!(1));

    let response = app
        .request_as_cashier(Method::GET, "/api/orders?startDate=yesterday", None)
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(
        body["error"]["message"],
        json!("Invalid startDate parameter")
    );

    let response = app
        .request_as_cashier(Method::GET, "/api/orders?endDate=2099-13-01", None)
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["error"]["message"], json!("Invalid endDate parameter"));
}

#[tokio::test]
async fn test_order_stats_cover_completed_revenue() {
    let app = TestApp::new().await;
    app.seed_product("REV-1", "Revenue A", dec!(8.20)).await;
    app.seed_product("REV-2", "Revenue B", dec!(0.50)).await;

    let a = create_order(&app, json!([{ "sku": "REV-1", "quantity": 1 }])).await;
    let b = create_order(&app, json!([{ "sku": "REV-2", "quantity": 1 }])).await;
    create_order(&app, json!([{ "sku": "REV-1", "quantity": 5 }])).await;

    for order in [&a, &b] {
        let id = order["data"]["id"].as_str().expect("order id");
        let response = app
            .request_as_cashier(
                Method::POST,
                &format!("/api/orders/{id}/complete"),
                Some(json!({ "paymentMethod": "CASH" })),
            )
            .await;
        assert_eq!(response.status(), 200);
    }

    let response = app.request(Method::GET, "/api/stats/orders", None, None).await;
    assert_eq!(response.status(), 401, "stats are staff-only");

    let response = app
        .request_as_cashier(Method::GET, "/api/stats/orders", None)
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    let stats = &body["data"];
    assert_eq!(stats["totalOrders"], json!(3));
    assert_eq!(stats["completedOrders"], json!(2));
    assert_eq!(stats["pendingOrders"], json!(1));
    // Totals: 8.20 -> 9.92 with tax, 0.50 -> 0.61; pending revenue excluded.
    assert_eq!(decimal_value(&stats["totalRevenue"]), dec!(10.53));
    assert_eq!(decimal_value(&stats["averageOrderValue"]), dec!(5.27));
}

#[tokio::test]
async fn test_top_products_rank_completed_volume() {
    let app = TestApp::new().await;
    app.seed_product("TOP-A", "Seller A", dec!(1.00)).await;
    app.seed_product("TOP-B", "Seller B", dec!(2.00)).await;

    let one = create_order(
        &app,
        json!([
            { "sku": "TOP-A", "quantity": 5 },
            { "sku": "TOP-B", "quantity": 1 }
        ]),
    )
    .await;
    let two = create_order(&app, json!([{ "sku": "TOP-A", "quantity": 2 }])).await;
    // A pending order must not count toward the ranking.
    create_order(&app, json!([{ "sku": "TOP-B", "quantity": 10 }])).await;

    for order in [&one, &two] {
        let id = order["data"]["id"].as_str().expect("order id");
        app.request_as_cashier(
            Method::POST,
            &format!("/api/orders/{id}/complete"),
            Some(json!({ "paymentMethod": "CARD" })),
        )
        .await;
    }

    let response = app
        .request_as_cashier(Method::GET, "/api/stats/top-products", None)
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    let rows = body["data"].as_array().expect("top products array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["sku"], json!("TOP-A"));
    assert_eq!(rows[0]["totalQuantity"], json!(7));
    assert_eq!(rows[0]["orderCount"], json!(2));
    assert_eq!(decimal_value(&rows[0]["totalRevenue"]), dec!(7.00));
    assert_eq!(rows[1]["sku"], json!("TOP-B"));
    assert_eq!(rows[1]["totalQuantity"], json!(1));

    let response = app
        .request_as_cashier(Method::GET, "/api/stats/top-products?limit=1", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    for bad in ["abc", "0", "101"] {
        let response = app
            .request_as_cashier(
                Method::GET,
                &format!("/api/stats/top-products?limit={bad}"),
                None,
            )
            .await;
        assert_eq!(response.status(), 400, "limit={bad} should be rejected");
        let body = response_json(response).await;
        assert_eq!(body["error"]["message"], json!("Invalid limit parameter"));
    }
}

#[tokio::test]
async fn test_payment_adjustment_keeps_order_status() {
    let app = TestApp::new().await;
    app.seed_product("REF-1", "Refundable", dec!(10.00)).await;
    let body = create_order(&app, json!([{ "sku": "REF-1", "quantity": 1 }])).await;
    let id = body["data"]["id"].as_str().expect("order id").to_string();
    let order_id = id.parse().expect("uuid");

    let response = app
        .request_as_cashier(
            Method::POST,
            &format!("/api/orders/{id}/complete"),
            Some(json!({ "paymentMethod": "CARD" })),
        )
        .await;
    assert_eq!(response.status(), 200);

    // Back-office refund path: adjusts payment fields only.
    app.state
        .services
        .orders
        .update_order_payment(order_id, PaymentMethod::Cash, PaymentStatus::Refunded)
        .await
        .expect("adjust payment");

    let response = app
        .request_as_cashier(Method::GET, &format!("/api/orders/{id}"), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("COMPLETED"));
    assert_eq!(body["data"]["paymentStatus"], json!("REFUNDED"));
    assert_eq!(body["data"]["paymentMethod"], json!("CASH"));
}
