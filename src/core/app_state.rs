use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::warn;

use crate::core::config::HarvestConfig;
use crate::features::persistence::ProductStore;
use crate::features::progress::StatusBoard;
use crate::scraping::browser_manager::{ChromiumLauncher, LaunchSettings};
use crate::scraping::surface::SessionLauncher;

#[derive(Clone)]
pub struct AppState {
    /// File-based config loaded from `vinted-harvest.json` (env-var fallback for all fields).
    pub config: Arc<HarvestConfig>,
    pub store: ProductStore,
    /// Run status + single-flight slot shared with the dashboard.
    pub status: Arc<StatusBoard>,
    /// `None` when no Chromium-family browser is installed.
    pub launcher: Option<Arc<dyn SessionLauncher>>,
    /// Cooperative shutdown flag, checked between harvest iterations.
    pub shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("data_dir", &self.store.dir())
            .field("browser_available", &self.launcher.is_some())
            .field("is_running", &self.status.is_running())
            .finish()
    }
}

impl AppState {
    /// State backed by the native Chromium launcher (if a browser is installed).
    pub fn new(config: HarvestConfig) -> Self {
        let launcher: Option<Arc<dyn SessionLauncher>> = match LaunchSettings::from_config(&config) {
            Ok(settings) => Some(Arc::new(ChromiumLauncher::new(settings))),
            Err(e) => {
                warn!("{}. Harvesting disabled; the catalog stays readable.", e);
                None
            }
        };
        Self::with_launcher(config, launcher)
    }

    pub fn with_launcher(config: HarvestConfig, launcher: Option<Arc<dyn SessionLauncher>>) -> Self {
        let store = ProductStore::new(config.resolve_data_dir());
        Self {
            config: Arc::new(config),
            store,
            status: StatusBoard::new(),
            launcher,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}
