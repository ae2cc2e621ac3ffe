use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    Router,
};
use http::{header, HeaderValue, Method};
use rust_decimal::Decimal;
use tokio::{net::TcpListener, signal, sync::mpsc};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use pos_api as api;

use api::auth::{AuthConfig, AuthService, ROLE_ADMIN};
use api::errors::ServiceError;
use api::services::users::CreateUserRequest;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    info!(environment = %cfg.environment, "starting pos-api");

    let db = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db).await?;
        info!("database migrations applied");
    }
    let db = Arc::new(db);

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    let auth_config = AuthConfig::from_app_config(&cfg);
    let auth_service = Arc::new(AuthService::new(auth_config));

    let tax_rate =
        Decimal::try_from(cfg.tax_rate).context("invalid tax_rate in configuration")?;
    let services = api::handlers::AppServices::new(
        db.clone(),
        Arc::new(event_sender.clone()),
        auth_service.clone(),
        tax_rate,
    );

    seed_admin_account(&cfg, &services).await?;

    let state = api::AppState {
        db: db.clone(),
        config: cfg.clone(),
        event_sender,
        services,
    };

    let cors_layer = build_cors_layer(&cfg)?;

    let app: Router = Router::new()
        .nest("/api", api::api_routes())
        .merge(api::openapi::swagger_ui())
        .fallback(api::endpoint_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer)
        .layer(axum::middleware::from_fn_with_state(
            auth_service.clone(),
            |State(auth): State<Arc<AuthService>>, mut req: Request<Body>, next: Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port in configuration")?;
    let listener = TcpListener::bind(addr).await?;
    info!("pos-api listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

/// Creates the bootstrap admin account when both seed variables are set.
///
/// A conflict means a previous boot already seeded the account, which is
/// fine; any other failure aborts startup so a misconfigured seed does not
/// go unnoticed.
async fn seed_admin_account(
    cfg: &api::config::AppConfig,
    services: &api::handlers::AppServices,
) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(email), Some(password)) = (&cfg.seed_admin_email, &cfg.seed_admin_password) else {
        return Ok(());
    };

    let request = CreateUserRequest {
        email: email.clone(),
        password: password.clone(),
        name: Some("Administrator".to_string()),
        role: Some(ROLE_ADMIN.to_string()),
    };
    match services.users.create_user(request).await {
        Ok(user) => info!(user_id = %user.id, email = %email, "seed admin account created"),
        Err(ServiceError::Conflict(_)) => {
            info!(email = %email, "seed admin account already present");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Builds the CORS layer from configuration.
///
/// Explicit origins get the browser-facing policy the frontend expects:
/// credentialed requests with the usual JSON verbs. Outside of that, a
/// permissive layer is handed out in development or on explicit opt-in,
/// so a production deployment cannot silently run wide open.
fn build_cors_layer(cfg: &api::config::AppConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg.cors_allowed_origins.as_ref().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect()
    });

    match configured_origins {
        Some(origins) if !origins.is_empty() => {
            info!(origins = origins.len(), "CORS restricted to configured origins");
            Ok(CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_credentials(true))
        }
        _ if cfg.should_allow_permissive_cors() => {
            info!("CORS allowing any origin");
            Ok(CorsLayer::permissive())
        }
        _ => {
            error!(
                "missing CORS configuration: set cors_allowed_origins or enable \
                 cors_allow_any_origin"
            );
            Err("missing CORS configuration".into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
