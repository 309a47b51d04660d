//! Top-level harvest operation: session manager → persistence, shared by the
//! CLI mode and the dashboard's background job.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::features::persistence::WrittenFiles;
use crate::features::progress::{ProgressSink, RunToken};
use crate::scraping::harvest::HarvestState;
use crate::scraping::session::SessionManager;
use crate::scraping::surface::SessionLauncher;
use crate::AppState;

#[derive(Debug)]
pub struct HarvestReport {
    pub products: usize,
    pub state: HarvestState,
    /// `None` when nothing was harvested (previous output is left in place).
    pub files: Option<WrittenFiles>,
}

impl HarvestReport {
    pub fn summary(&self) -> String {
        if self.products == 0 {
            "No products found".to_string()
        } else {
            format!("Completed: {} products", self.products)
        }
    }
}

/// Harvest `target` products from `url` and persist them.
pub async fn harvest_and_save(
    state: &AppState,
    launcher: Arc<dyn SessionLauncher>,
    url: &str,
    target: usize,
    progress: &dyn ProgressSink,
) -> Result<HarvestReport> {
    let manager = SessionManager::from_config(launcher, &state.config)
        .with_cancel(Arc::clone(&state.shutdown));
    let outcome = manager.run(url, target, progress).await?;

    let files = if outcome.products.is_empty() {
        None
    } else {
        Some(
            state
                .store
                .write(&outcome.products, &state.config.resolve_source())
                .await?,
        )
    };

    Ok(HarvestReport {
        products: outcome.products.len(),
        state: outcome.state,
        files,
    })
}

/// Background job body for the dashboard. Always releases `token`, writing
/// the run's final message into the status board.
pub async fn run_dashboard_job(
    state: Arc<AppState>,
    launcher: Arc<dyn SessionLauncher>,
    token: RunToken,
    url: String,
    target: usize,
) {
    let board = Arc::clone(token.board());
    let message = match harvest_and_save(&state, launcher, &url, target, board.as_ref()).await {
        Ok(report) => {
            info!(state = ?report.state, "Dashboard harvest done: {}", report.summary());
            report.summary()
        }
        Err(e) => {
            error!("Harvest error: {:#}", e);
            format!("Error: {}", e)
        }
    };
    token.finish(message);
}
