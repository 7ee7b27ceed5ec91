mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::delete, routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{cloud_api::CloudApiClient, gateway::GatewayClient, queue::JobQueue};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing campaign-dispatch server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register the series this process emits. Send/skip counters and the
    // queue gauge belong to the worker binary and its own exporter.
    metrics::describe_counter!(
        "campaign_contacts_scheduled",
        "Total contacts scheduled for dispatch"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url, 20)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    // Initialize gateway clients
    tracing::info!("Initializing chat gateway client");
    let gateway = GatewayClient::new(&config.gateway_url, &config.gateway_api_key)
        .expect("Failed to initialize gateway client");

    let cloud_api = CloudApiClient::new().expect("Failed to initialize Cloud API client");

    // Create shared application state
    let state = AppState::new(
        db_pool,
        queue,
        gateway,
        cloud_api,
        config.default_segment.clone(),
        config.country_prefix.clone(),
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/campaigns/dispatch",
            post(routes::campaigns::dispatch_campaign),
        )
        .route(
            "/api/v1/campaigns/{name}/status",
            get(routes::campaigns::campaign_status),
        )
        .route(
            "/api/v1/campaigns/{name}/pause",
            post(routes::campaigns::pause_campaign),
        )
        .route(
            "/api/v1/campaigns/{name}",
            delete(routes::campaigns::delete_campaign),
        )
        .route(
            "/api/v1/lines/{id}/rate-limit",
            get(routes::lines::line_rate_limit),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting campaign-dispatch on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
