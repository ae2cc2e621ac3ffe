//! Shared harness for the HTTP integration tests.
//!
//! Each [`TestApp`] wires the full application against its own temporary
//! SQLite file, runs the migrations, and seeds one user per role. Requests
//! go through the real router, including the auth middleware, via
//! `tower::ServiceExt::oneshot`.

// Compiled into every test binary; not every binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    extract::State,
    http::{Method, Request},
    middleware,
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use pos_api::{
    auth::{AuthConfig, AuthService, ROLE_ADMIN, ROLE_CASHIER},
    config::AppConfig,
    db,
    events::{self, EventSender},
    handlers::AppServices,
    services::products::{CreateProductRequest, ProductResponse},
    services::users::CreateUserRequest,
    AppState,
};

pub const ADMIN_EMAIL: &str = "admin@pos.test";
pub const ADMIN_PASSWORD: &str = "admin-secret-1";
pub const CASHIER_EMAIL: &str = "cashier@pos.test";
pub const CASHIER_PASSWORD: &str = "cashier-secret-1";

pub const TEST_JWT_SECRET: &str =
    "integration-test-secret-0123456789abcdef0123456789abcdef0123456789abcdef";

/// Tax rate the harness configures; tests that assert totals assume it.
pub const TEST_TAX_RATE: Decimal = dec!(0.21);

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin_id: Uuid,
    pub cashier_id: Uuid,
    admin_token: String,
    cashier_token: String,
    _db_file: NamedTempFile,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Builds a fresh application with migrations applied and an admin and
    /// a cashier account seeded. Tokens come from real logins so the whole
    /// auth path is exercised on every construction.
    pub async fn new() -> Self {
        let db_file = NamedTempFile::new().expect("create temporary database file");
        let database_url = format!("sqlite://{}?mode=rwc", db_file.path().display());

        let mut cfg = AppConfig::new(
            database_url,
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("connect to test database");
        db::run_migrations(&pool).await.expect("run migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from_app_config(&cfg)));
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            auth_service.clone(),
            TEST_TAX_RATE,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api", pos_api::api_routes())
            .fallback(pos_api::endpoint_not_found)
            .layer(middleware::from_fn_with_state(
                auth_service,
                |State(auth): State<Arc<AuthService>>,
                 mut req: Request<Body>,
                 next: middleware::Next| async move {
                    req.extensions_mut().insert(auth);
                    next.run(req).await
                },
            ))
            .with_state(state.clone());

        let admin = state
            .services
            .users
            .create_user(CreateUserRequest {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
                name: Some("Test Admin".to_string()),
                role: Some(ROLE_ADMIN.to_string()),
            })
            .await
            .expect("seed admin user");
        let cashier = state
            .services
            .users
            .create_user(CreateUserRequest {
                email: CASHIER_EMAIL.to_string(),
                password: CASHIER_PASSWORD.to_string(),
                name: Some("Test Cashier".to_string()),
                role: Some(ROLE_CASHIER.to_string()),
            })
            .await
            .expect("seed cashier user");

        let mut app = Self {
            router,
            state,
            admin_id: admin.id,
            cashier_id: cashier.id,
            admin_token: String::new(),
            cashier_token: String::new(),
            _db_file: db_file,
            _event_task: event_task,
        };
        app.admin_token = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        app.cashier_token = app.login(CASHIER_EMAIL, CASHIER_PASSWORD).await;
        app
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn cashier_token(&self) -> &str {
        &self.cashier_token
    }

    /// Logs in over HTTP and returns the bearer token.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/login",
                Some(json!({ "email": email, "password": password })),
                None,
            )
            .await;
        assert_eq!(response.status(), 200, "login should succeed for {email}");
        let body = response_json(response).await;
        body["data"]["token"]
            .as_str()
            .expect("login response carries a token")
            .to_string()
    }

    /// Send a request with an optional JSON body and bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a request with a raw body and explicit content type, for
    /// malformed-payload cases the JSON helper cannot express.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        content_type: &str,
        body: Vec<u8>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", content_type);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body)).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_as_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(&self.admin_token))
            .await
    }

    pub async fn request_as_cashier(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(&self.cashier_token))
            .await
    }

    /// Send a multipart/form-data request carrying a single form field.
    pub async fn upload_multipart(
        &self,
        token: Option<&str>,
        field_name: &str,
        filename: &str,
        content: &str,
    ) -> Response {
        const BOUNDARY: &str = "pos-api-test-boundary";
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field_name}\"; \
             filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n--{BOUNDARY}--\r\n"
        );
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/import/csv")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder
            .body(Body::from(body))
            .expect("build multipart request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Upload a CSV under the `file` field, the shape the import endpoint expects.
    pub async fn upload_csv(&self, token: &str, filename: &str, csv: &str) -> Response {
        self.upload_multipart(Some(token), "file", filename, csv)
            .await
    }

    /// Seed a product directly through the service layer.
    pub async fn seed_product(&self, sku: &str, name: &str, price: Decimal) -> ProductResponse {
        self.state
            .services
            .products
            .create_product(CreateProductRequest {
                sku: sku.to_string(),
                name: name.to_string(),
                description: None,
                price,
                color: None,
                image_url: None,
                is_active: Some(true),
            })
            .await
            .expect("seed product")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Read a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("json response body")
}

/// Parse a decimal field that the API serialized as a JSON string.
///
/// SQLite round-trips decimals through REAL, so trailing zeros are not
/// preserved; parsing keeps the comparisons scale-agnostic.
pub fn decimal_value(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("decimal fields serialize as strings")
        .parse()
        .expect("parse decimal field")
}
