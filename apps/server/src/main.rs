mod alert_layer;
mod auth;
mod booking;
mod db;
mod error;
mod flow;
mod handlers;
mod models;
mod notify;
mod rate_limit;
mod schedule;
mod studio;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use rate_limit::{rate_limit_admin, rate_limit_booking, rate_limit_public, RateLimiter};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub started_at: Instant,
    pub admin_token: String,
    pub payment_api_url: String,
    pub payment_api_key: String,
    pub notify_webhook_url: String,
    pub webapp_url: String,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

fn env_url(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name).unwrap_or_default();
    if !value.is_empty() {
        url::Url::parse(&value)
            .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    }
    Ok(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:studio.db?mode=rwc".into());

    // ── Tracing: console + optional ops webhook for error alerts ──
    let ops_webhook_url = env_url("OPS_WEBHOOK_URL")?;
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    let fmt_layer = tracing_subscriber::fmt::layer();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if !ops_webhook_url.is_empty() {
        registry
            .with(alert_layer::AlertLayer::new(ops_webhook_url))
            .init();
    } else {
        registry.init();
    }

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());

    // ── Optional env vars ──
    let admin_token = std::env::var("ADMIN_TOKEN").unwrap_or_default();
    let payment_api_url = env_url("PAYMENT_API_URL")?;
    let payment_api_key = std::env::var("PAYMENT_API_KEY").unwrap_or_default();
    let notify_webhook_url = env_url("NOTIFY_WEBHOOK_URL")?;
    let webapp_url = env_url("WEBAPP_URL")?;

    if admin_token.is_empty() {
        tracing::warn!("ADMIN_TOKEN not set, admin endpoints are disabled");
    }
    if payment_api_url.is_empty() {
        tracing::warn!("PAYMENT_API_URL not set, signal payments will fail");
    }

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        started_at: Instant::now(),
        admin_token,
        payment_api_url,
        payment_api_key,
        notify_webhook_url,
        webapp_url: webapp_url.clone(),
    });

    // ── Rate limiter + stale-entry cleanup ──
    let rate_limiter = RateLimiter::new();
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist WEBAPP_URL when configured, otherwise allow any ──
    let cors = if !webapp_url.is_empty() {
        let origins: Vec<axum::http::HeaderValue> = vec![
            webapp_url.parse().expect("WEBAPP_URL must be a valid URL"),
            "http://localhost:5173".parse().unwrap(), // Vite dev server
        ];
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // ── Router (4 groups with per-group rate limits) ──

    // 1. No-limit: health checks + payment webhooks
    let no_limit_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/payments/webhook",
            post(handlers::payment::payment_webhook),
        );

    // 2. Public: read-only endpoints (no auth, 60 req/min)
    let public_routes = Router::new()
        .route("/api/public/{slug}", get(handlers::public::studio_snapshot))
        .route(
            "/api/public/{slug}/slots",
            get(handlers::public::available_slots),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_public));

    // 3. Booking creation: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route(
            "/api/public/{slug}/bookings",
            post(handlers::public::create_booking),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_booking));

    // 4. Admin: appointment management (120 req/min)
    let admin_routes = Router::new()
        .route(
            "/api/admin/appointments",
            get(handlers::admin::list_appointments),
        )
        .route(
            "/api/admin/appointments/{id}/confirm",
            post(handlers::admin::confirm_appointment),
        )
        .route(
            "/api/admin/appointments/{id}/complete",
            post(handlers::admin::complete_appointment),
        )
        .route(
            "/api/admin/appointments/{id}/cancel",
            post(handlers::admin::cancel_appointment),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_admin));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Studio booking server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
