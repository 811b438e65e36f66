//! HTTP routes definition

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiResponse;
use super::{handlers, search_handlers, AppState};

/// Catalog API
///
/// - GET    /api/records/:ns?ids=1,2            - Load records
/// - POST   /api/records/:ns                    - Save records (replace)
/// - PATCH  /api/records/:ns                    - Save records (merge)
/// - DELETE /api/records/:ns?ids=1,2            - Delete records
/// - GET    /api/links/:ns/:id/:target          - Linked ids
/// - GET    /api/sync/:ns?since=N               - Change feed
/// - GET    /api/search/:ns?q=&all=             - Search one namespace
/// - GET    /api/suggest?q=                     - Suggestions across namespaces
pub fn api_routes() -> Router {
    Router::new()
        .route(
            "/api/records/:ns",
            get(handlers::get_records)
                .post(handlers::put_records)
                .patch(handlers::patch_records)
                .delete(handlers::delete_records),
        )
        .route(
            "/api/records/:ns/:id",
            get(handlers::get_record).delete(handlers::delete_record),
        )
        .route(
            "/api/links/:ns/:id/:target",
            get(handlers::get_links)
                .post(handlers::post_links)
                .delete(handlers::delete_links),
        )
        .route("/api/sync/:ns", get(handlers::get_changes))
        .route("/api/search/:ns", get(search_handlers::search))
        .route("/api/alphabet/:ns", get(search_handlers::alphabet))
        .route("/api/browse/:ns/:letter", get(search_handlers::browse))
        .route("/api/suggest", get(search_handlers::suggest))
        .route("/api/rebuild", post(search_handlers::rebuild))
}

/// Health check routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/_health", get(health))
        .route("/_metrics", get(metrics_endpoint))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub pool_size: usize,
    pub pool_available: usize,
    pub uptime_secs: u64,
}

/// Liveness with store pool occupancy
async fn health(Extension(state): Extension<Arc<AppState>>) -> ApiResponse<HealthStatus> {
    let storage = state.catalog.storage();
    ApiResponse::ok(HealthStatus {
        status: "ok",
        version: crate::VERSION,
        backend: storage.backend(),
        pool_size: storage.pool_size(),
        pool_available: storage.available(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

/// Prometheus metrics endpoint
async fn metrics_endpoint() -> String {
    crate::metrics::export_metrics()
}
