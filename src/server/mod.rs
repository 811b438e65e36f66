//! MedRef HTTP server
//!
//! axum router over the [`Catalog`]. Every handler answers with the
//! `{success, data, error}` envelope from [`error::ApiResponse`].

pub mod error;
pub mod handlers;
pub mod lang;
pub mod middleware;
pub mod routes;
pub mod search_handlers;

use axum::{
    extract::{DefaultBodyLimit, Extension},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::config::AppConfig;

pub use error::{ApiError, ApiResponse};
pub use lang::RequestLang;

/// Shared application state
pub struct AppState {
    pub catalog: Catalog,
    pub config: AppConfig,
    pub started: Instant,
}

impl AppState {
    pub fn new(catalog: Catalog, config: AppConfig) -> Self {
        Self {
            catalog,
            config,
            started: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish()
    }
}

/// Build the router with every route and layer
pub fn build_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let timeout = Duration::from_secs(server.timeout_secs);
    let enable_cors = server.enable_cors;

    let app = Router::new()
        .merge(routes::api_routes())
        .merge(routes::health_routes())
        .layer(axum::middleware::from_fn(middleware::log_request))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server.max_body_size))
        .layer(Extension(state.clone()))
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Serve the API until `shutdown` resolves
pub async fn start_server<F>(state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.config.server.http_addr, state.config.server.http_port);
    info!(
        addr = %addr,
        backend = state.catalog.storage().backend(),
        pool_size = state.catalog.storage().pool_size(),
        "Starting MedRef HTTP server"
    );

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Metrics: http://{}/_metrics", addr);
    info!("Health: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("Server failed: {}", e)
        })?;

    info!("Server stopped");
    Ok(())
}
