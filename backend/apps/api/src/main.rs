//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request-path errors go through
//! `kernel::error::AppError` and the throttle layer's envelopes.

mod routes;

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, Method, Request, header};
use axum::middleware::{self, Next};
use axum::routing::{get, post};
use axum::{Router, http};
use sqlx::postgres::PgPoolOptions;
use throttle::{
    AuditSink, Bucket, IdempotencyGuard, IdempotencyState, PgThrottleRepository, RateLimitState,
    RateLimitUseCase, ThrottleConfig, TracingAuditSink, enforce_rate_limit, idempotency_gate,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,throttle=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    let repo = PgThrottleRepository::new(pool.clone());

    // Startup cleanup: drop stale windows and expired idempotency records.
    // Errors here should not prevent server startup.
    let now_ms = chrono::Utc::now().timestamp_millis();
    match repo.cleanup_expired(now_ms).await {
        Ok((windows, records)) => {
            tracing::info!(
                rate_limit_windows = windows,
                idempotency_records = records,
                "Throttle cleanup completed"
            );
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Throttle cleanup failed, continuing anyway"
            );
        }
    }

    // Throttle configuration; the closed bucket set is validated up front
    let config = Arc::new(ThrottleConfig::default());
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid throttle config: {}", e))?;

    for bucket in Bucket::ALL {
        tracing::info!(
            bucket = %bucket,
            limit_per_minute = config.limit_for(bucket),
            "Rate limit bucket configured"
        );
    }

    let sink: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let repo = Arc::new(repo);

    let rate_limit_state = RateLimitState {
        use_case: Arc::new(RateLimitUseCase::new(
            repo.clone(),
            sink.clone(),
            config.clone(),
        )),
        bucket: Bucket::TradeCreate,
    };
    let idempotency_state = IdempotencyState {
        guard: Arc::new(IdempotencyGuard::new(repo, sink, config)),
    };

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([Method::GET, Method::POST]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            HeaderName::from_static("idempotency-key"),
        ]));

    // Rate limiting runs first, then the idempotency gate, then the
    // handler; layers apply inside-out so the limiter is added last
    let trades = Router::new()
        .route("/api/trades", post(routes::create_trade))
        .layer(middleware::from_fn(move |req: Request<Body>, next: Next| {
            idempotency_gate(idempotency_state.clone(), req, next)
        }))
        .layer(middleware::from_fn(move |req: Request<Body>, next: Next| {
            enforce_rate_limit(rate_limit_state.clone(), req, next)
        }))
        .with_state(routes::ApiState { pool });

    let app = Router::new()
        .route("/health", get(routes::health))
        .merge(trades)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
