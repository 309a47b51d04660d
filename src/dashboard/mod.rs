//! HTTP dashboard: catalog queries, run control and live progress.

mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use handlers::PROGRESS_TICK;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health_check))
        .route("/health", get(handlers::health_check))
        .route("/api/products", get(handlers::get_products))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/scrape", post(handlers::start_harvest))
        .route("/api/scrape/status", get(handlers::harvest_status))
        .route("/api/scrape/progress", get(handlers::harvest_progress))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
