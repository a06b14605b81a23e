pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod http;
mod middleware;
pub mod models;
pub mod query;
pub mod state;
pub mod store;

use std::sync::Arc;

use axum::{Router, http::Uri};
use tower_http::trace::TraceLayer;

use crate::{
    config::{Config, StoreBackend},
    errors::AppError,
    middleware::cors_layer,
    state::AppState,
    store::{MemoryStore, RedisStore, SharedStore},
};

pub async fn connect_store(config: &Config) -> Result<SharedStore, AppError> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| AppError::EnvError("REDIS_URL must be set".into()))?;
            let store = RedisStore::connect(redis_url, config.store_timeout).await?;
            Ok(Arc::new(store))
        }
    }
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Can't find {} on this server", uri))
}

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .merge(http::create_http_routes(state))
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn start_server() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let store = connect_store(&config).await?;
    let state = AppState::new(store, config.clone());

    if config.recompute_on_start {
        state.ratings.recompute_all().await?;
    }

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Tours server running at http://127.0.0.1:{}/api/v1", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}
