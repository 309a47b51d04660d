use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::features::catalog;
use crate::features::progress::RunStatus;
use crate::tools::harvest::run_dashboard_job;
use crate::types::*;
use crate::AppState;

/// Interval between status pushes on the progress stream.
pub const PROGRESS_TICK: Duration = Duration::from_secs(1);

pub(super) async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "vinted-harvest",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub(super) async fn get_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Json<ProductsResponse> {
    let ProductCatalog { metadata, products } = state.store.load().await;
    let products = catalog::apply_query(products, &query);
    Json(ProductsResponse {
        total: products.len(),
        products,
        metadata,
    })
}

pub(super) async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let ProductCatalog { metadata, products } = state.store.load().await;
    let stats = catalog::stats(&products);
    Json(StatsResponse {
        total_products: products.len(),
        brands: stats.brands,
        sizes: stats.sizes,
        conditions: stats.conditions,
        price_range: stats.price_range,
        last_update: metadata.scraped_at,
    })
}

fn reply(
    status: StatusCode,
    success: bool,
    message: impl Into<String>,
) -> (StatusCode, Json<StartHarvestResponse>) {
    (
        status,
        Json(StartHarvestResponse {
            success,
            message: message.into(),
        }),
    )
}

/// Start a background harvest. The body is optional; an empty body runs with
/// the configured defaults.
pub(super) async fn start_harvest(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, Json<StartHarvestResponse>) {
    let request: StartHarvestRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartHarvestRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                return reply(StatusCode::BAD_REQUEST, false, format!("Invalid request body: {}", e))
            }
        }
    };

    let Some(launcher) = state.launcher.clone() else {
        return reply(
            StatusCode::SERVICE_UNAVAILABLE,
            false,
            "No Chromium-family browser available on this host",
        );
    };

    let target = request
        .max_products
        .unwrap_or_else(|| state.config.resolve_max_products());
    let url = request
        .url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| state.config.resolve_target_url());

    let token = match state.status.try_begin(target) {
        Ok(token) => token,
        Err(e) => {
            warn!("Rejected harvest start: {}", e);
            return reply(StatusCode::CONFLICT, false, e.to_string());
        }
    };

    info!(run_id = %token.run_id(), %url, target, "Dashboard harvest requested");
    tokio::spawn(run_dashboard_job(Arc::clone(&state), launcher, token, url, target));

    reply(StatusCode::OK, true, "Harvest started")
}

pub(super) async fn harvest_status(State(state): State<Arc<AppState>>) -> Json<RunStatus> {
    Json(state.status.status())
}

/// Server-sent events carrying [`RunStatus`] snapshots. The stream closes
/// right after the run (if any) ends.
pub(super) async fn harvest_progress(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = Arc::clone(&state.status)
        .stream(PROGRESS_TICK)
        .map(|status| {
            let event = Event::default().json_data(&status).unwrap_or_else(|e| {
                warn!("Progress event encoding failed: {}", e);
                Event::default().comment("encoding error")
            });
            Ok(event)
        });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
