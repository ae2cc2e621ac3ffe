//! Staff account administration: listing, CRUD, and the admin-only gate.

mod common;

use axum::http::Method;
use common::{response_json, TestApp, ADMIN_EMAIL, CASHIER_EMAIL};
use serde_json::json;

#[tokio::test]
async fn test_list_users_is_admin_only() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/users", None, None).await;
    assert_eq!(response.status(), 401);

    let response = app.request_as_cashier(Method::GET, "/api/users", None).await;
    assert_eq!(response.status(), 403);

    let response = app.request_as_admin(Method::GET, "/api/users", None).await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    assert_eq!(body["meta"]["total"], json!(2));
    let emails: Vec<&str> = body["data"]
        .as_array()
        .expect("data is an array")
        .iter()
        .map(|u| u["email"].as_str().expect("email"))
        .collect();
    // Oldest account first.
    assert_eq!(emails, vec![ADMIN_EMAIL, CASHIER_EMAIL]);
}

#[tokio::test]
async fn test_user_payloads_never_leak_password_hashes() {
    let app = TestApp::new().await;

    let response = app.request_as_admin(Method::GET, "/api/users", None).await;
    let body = response_json(response).await;
    for user in body["data"].as_array().expect("data is an array") {
        assert!(user.get("passwordHash").is_none());
        assert!(user.get("password_hash").is_none());
    }
}

#[tokio::test]
async fn test_create_user_with_explicit_role() {
    let app = TestApp::new().await;

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/users",
            Some(json!({
                "email": "manager@pos.test",
                "password": "manager-pass-1",
                "name": "Shift Manager",
                "role": "ADMIN"
            })),
        )
        .await;
    assert_eq!(response.status(), 201);

    let body = response_json(response).await;
    assert_eq!(body["data"]["role"], json!("ADMIN"));
    assert_eq!(body["data"]["name"], json!("Shift Manager"));

    // The new admin can use gated endpoints right away.
    let token = app.login("manager@pos.test", "manager-pass-1").await;
    let response = app
        .request(Method::GET, "/api/users", None, Some(&token))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_get_user_by_id() {
    let app = TestApp::new().await;

    let response = app
        .request_as_admin(Method::GET, &format!("/api/users/{}", app.cashier_id), None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["email"], json!(CASHIER_EMAIL));

    let response = app
        .request_as_admin(
            Method::GET,
            &format!("/api/users/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["error"]["message"], json!("User not found"));

    let response = app
        .request_as_admin(Method::GET, "/api/users/42", None)
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["error"]["message"], json!("Invalid user id"));
}

#[tokio::test]
async fn test_update_user_email_and_name() {
    let app = TestApp::new().await;

    let response = app
        .request_as_admin(
            Method::PUT,
            &format!("/api/users/{}", app.cashier_id),
            Some(json!({ "name": "Renamed Cashier" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["name"], json!("Renamed Cashier"));
    assert_eq!(body["data"]["email"], json!(CASHIER_EMAIL), "email untouched");

    let response = app
        .request_as_admin(
            Method::PUT,
            &format!("/api/users/{}", app.cashier_id),
            Some(json!({ "email": "till@pos.test" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["email"], json!("till@pos.test"));

    // Roles are assigned at creation; the update payload does not carry one.
    let response = app
        .request_as_admin(
            Method::PUT,
            &format!("/api/users/{}", app.cashier_id),
            Some(json!({ "role": "ADMIN" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["role"], json!("CASHIER"));
}

#[tokio::test]
async fn test_update_user_rejects_taken_email() {
    let app = TestApp::new().await;

    let response = app
        .request_as_admin(
            Method::PUT,
            &format!("/api/users/{}", app.cashier_id),
            Some(json!({ "email": ADMIN_EMAIL })),
        )
        .await;
    assert_eq!(response.status(), 409);

    let body = response_json(response).await;
    assert_eq!(
        body["error"]["message"],
        json!(format!("Email {} is already in use", ADMIN_EMAIL))
    );
}

#[tokio::test]
async fn test_delete_user() {
    let app = TestApp::new().await;

    let response = app
        .request_as_admin(
            Method::DELETE,
            &format!("/api/users/{}", app.cashier_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body, json!({ "success": true }));

    let response = app
        .request_as_admin(Method::GET, &format!("/api/users/{}", app.cashier_id), None)
        .await;
    assert_eq!(response.status(), 404);

    let response = app
        .request_as_admin(
            Method::DELETE,
            &format!("/api/users/{}", app.cashier_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(
        body["error"]["message"],
        json!(format!("User with id {} not found", app.cashier_id))
    );
}
