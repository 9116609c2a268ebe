//! Carrel Server - Book Reservation System

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carrel_server::{
    api,
    config::AppConfig,
    repository::{carts::RedisCartRepository, Repository},
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("carrel_server={},tower_http=debug", config.logging.level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Carrel Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Initialize the Redis-backed cart storage
    let cart_store = RedisCartRepository::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");

    tracing::info!("Connected to Redis");

    // Save server address before moving config
    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let sweep_interval = Duration::from_secs(config.reservations.sweep_interval_seconds);

    // Create repository and services
    let repository = Repository::new(pool.clone());
    let services = Services::new(
        repository,
        Arc::new(cart_store),
        config.reservations.clone(),
    );

    // Start the periodic lifecycle sweep
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweep_handle = services.clock.clone().spawn(sweep_interval, shutdown_rx);

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
        pool,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(
        server_host.parse().expect("Invalid host address"),
        server_port,
    );

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    // Stop the lifecycle sweep before exiting
    let _ = shutdown_tx.send(true);
    let _ = sweep_handle.await;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Copies (read-only availability view)
        .route("/copies/:id", get(api::copies::get_copy))
        // Cart
        .route("/cart", get(api::cart::get_cart))
        .route("/cart", delete(api::cart::clear_cart))
        .route("/cart/items", post(api::cart::add_cart_item))
        .route("/cart/items/:copy_id", delete(api::cart::remove_cart_item))
        // Reservations
        .route("/reservations", post(api::reservations::checkout))
        .route("/reservations", get(api::reservations::list_reservations))
        .route("/reservations/mine", get(api::reservations::list_my_reservations))
        .route("/reservations/attention", get(api::reservations::list_attention))
        .route("/reservations/:id", get(api::reservations::get_reservation))
        .route("/reservations/:id/approve", post(api::reservations::approve_reservation))
        .route("/reservations/:id/reject", post(api::reservations::reject_reservation))
        .route("/reservations/:id/pickup", post(api::reservations::mark_picked_up))
        .route("/reservations/:id/return", post(api::reservations::mark_returned))
        .with_state(state.clone());

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
