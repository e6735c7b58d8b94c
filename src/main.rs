use axum::http::HeaderValue;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod abi;
mod api;
mod cache;
mod codec;
mod config;
mod constants;
mod db;
mod error;
mod gateway;
mod models;
mod services;

use abi::AbiRegistry;
use cache::Cache;
use config::Config;
use constants::API_VERSION;
use db::Database;
use gateway::{ElasticClient, VmQueryClient};
use models::PixelColor;
use services::{PixelService, PixelSyncJob};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xplace_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting xPlace Backend Server");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!(
        "Network: {}",
        if config.is_testnet() { "testnet" } else { "mainnet" }
    );
    tracing::info!("API Version: {}", API_VERSION);

    // Initialize database
    let db = Database::new(&config).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    // Load the contract ABI and check the color palette against it
    let registry = Arc::new(AbiRegistry::from_embedded()?);
    PixelColor::validate_against(&registry)?;

    let cache = Arc::new(Cache::new());
    let contract = Arc::new(VmQueryClient::new(&config, registry.clone())?);
    let elastic = Arc::new(ElasticClient::new(&config)?);

    let pixel_service = Arc::new(PixelService::new(
        Arc::new(db.clone()),
        cache,
        contract,
        registry.clone(),
        &config,
    ));

    let app_state = api::AppState {
        db: db.clone(),
        pixels: pixel_service.clone(),
        config: config.clone(),
    };

    // Build router
    let app = build_router(app_state);

    // Start background services
    let sync_job = Arc::new(PixelSyncJob::new(
        pixel_service,
        elastic,
        registry,
        &config,
    ));
    tokio::spawn(services::start_background_services(sync_job));

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Pixels
        .route("/api/v1/pixels", get(api::pixels::get_all_pixels))
        .route("/api/v1/pixels/config", get(api::pixels::get_pixel_config))
        .route("/api/v1/pixels/{x}/{y}", get(api::pixels::get_pixel_infos))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
