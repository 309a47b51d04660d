//! Native browser management using `chromiumoxide`.
//!
//! This module is the **single source of truth** for:
//! * Finding a usable browser executable (Chrome → Chromium → Brave).
//! * Building the launch config (fixed viewport, realistic user-agent, head/headless).
//! * `ChromiumLauncher` / `ChromiumSession`: the live implementation of the
//!   `SessionLauncher`, `BrowsingSession` and `BrowsingSurface` seams.
//! * The `wait_until_stable` networkidle heuristic used after navigation.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::surface::{BrowsingSession, BrowsingSurface, SessionLauncher, SurfaceError};
use crate::core::config::{chrome_executable_override, HarvestConfig};

const HEIGHT_SCRIPT: &str =
    "Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight)";
const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

// ── Browser executable discovery ─────────────────────────────────────────────

/// Binary names looked up on `PATH`, in preference order.
const PATH_NAMES: &[&str] = &["google-chrome", "chromium", "chromium-browser", "brave-browser"];

#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "linux")]
const INSTALL_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

#[cfg(target_os = "windows")]
const INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const INSTALL_PATHS: &[&str] = &[];

/// Browser used for harvesting: `CHROME_EXECUTABLE`, else the first
/// [`PATH_NAMES`] hit on `PATH`, else a well-known install location.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = chrome_executable_override() {
        return Some(p);
    }

    let on_path = std::env::var_os("PATH").and_then(|path| {
        std::env::split_paths(&path)
            .flat_map(|dir| PATH_NAMES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    });
    if let Some(found) = on_path {
        return Some(found.to_string_lossy().into_owned());
    }

    INSTALL_PATHS
        .iter()
        .find(|p| Path::new(p).is_file())
        .map(|p| p.to_string())
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Everything needed to launch one browser for a harvest.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub executable: String,
    pub headless: bool,
    pub width: u32,
    pub height: u32,
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub idle_quiet: Duration,
    pub idle_timeout: Duration,
}

impl LaunchSettings {
    /// Resolve settings from config; fails when no browser is installed.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, SurfaceError> {
        let executable = find_chrome_executable().ok_or_else(|| {
            SurfaceError::Launch(
                "No Chrome, Chromium or Brave executable found; set CHROME_EXECUTABLE".to_string(),
            )
        })?;
        let (width, height) = config.resolve_viewport();
        Ok(Self {
            executable,
            headless: config.resolve_headless(),
            width,
            height,
            user_agent: config.resolve_user_agent(),
            navigation_timeout: config.resolve_navigation_timeout(),
            idle_quiet: config.pacing.idle_quiet(),
            idle_timeout: config.pacing.idle_timeout(),
        })
    }
}

/// Build a `BrowserConfig` with a fixed desktop viewport and identity string.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag, which trips trivial bot checks.
pub fn build_browser_config(settings: &LaunchSettings) -> Result<BrowserConfig, SurfaceError> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(&settings.executable)
        .viewport(Viewport {
            width: settings.width,
            height: settings.height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(settings.width, settings.height)
        .request_timeout(settings.navigation_timeout)
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage") // avoids /dev/shm OOM in constrained environments
        .arg("--disable-extensions")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", settings.user_agent));

    if settings.headless {
        builder = builder.arg("--disable-gpu");
    } else {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| SurfaceError::Launch(format!("Failed to build browser config: {}", e)))
}

// ── Network idle ─────────────────────────────────────────────────────────────

const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";
const READY_STATE_SCRIPT: &str = "document.readyState";
const IDLE_POLL: Duration = Duration::from_millis(250);

async fn eval_json(page: &Page, script: &str) -> Option<serde_json::Value> {
    page.evaluate(script).await.ok()?.into_value().ok()
}

/// Return once the document is `complete` and no resource entry has been
/// added for `quiet`, or after `timeout` at the latest.
pub async fn wait_until_stable(page: &Page, quiet: Duration, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    let mut last_count = None;
    let mut quiet_since = Instant::now();

    while Instant::now() < deadline {
        let count = eval_json(page, RESOURCE_COUNT_SCRIPT)
            .await
            .and_then(|v| v.as_u64());
        let complete = eval_json(page, READY_STATE_SCRIPT)
            .await
            .is_some_and(|v| v == "complete");

        if !complete || count != last_count {
            last_count = count;
            quiet_since = Instant::now();
        } else if quiet_since.elapsed() >= quiet {
            debug!(resources = ?count, "network idle");
            return;
        }
        tokio::time::sleep(IDLE_POLL).await;
    }
    info!("Network never went idle within {:?}; continuing", timeout);
}

// ── Launcher / session ───────────────────────────────────────────────────────

/// Launches one fresh Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    settings: LaunchSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: LaunchSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn open(&self) -> Result<Box<dyn BrowsingSession>, SurfaceError> {
        let s = &self.settings;
        info!(
            "🚀 Launching browser ({}, {}x{}, headless={})",
            s.executable, s.width, s.height, s.headless
        );
        let config = build_browser_config(s)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SurfaceError::Launch(format!("{} ({})", e, s.executable)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(SurfaceError::Launch(format!("Failed to open tab: {}", e)));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            page,
            handler_task: Some(handler_task),
            idle_quiet: s.idle_quiet,
            idle_timeout: s.idle_timeout,
        }))
    }
}

/// One live browser + tab. Closed explicitly by the session manager; `Drop`
/// is the backstop so Chromium never outlives its session.
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    idle_quiet: Duration,
    idle_timeout: Duration,
}

impl ChromiumSession {
    async fn eval_u64(&self, script: &str) -> Result<u64, SurfaceError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| SurfaceError::Evaluate(e.to_string()))?
            .into_value::<serde_json::Value>()
            .map_err(|e| SurfaceError::Evaluate(e.to_string()))?
            .as_f64()
            .map(|h| h.max(0.0) as u64)
            .ok_or_else(|| SurfaceError::Evaluate(format!("`{}` returned a non-number", script)))
    }
}

#[async_trait]
impl BrowsingSurface for ChromiumSession {
    async fn content_height(&mut self) -> Result<u64, SurfaceError> {
        self.eval_u64(HEIGHT_SCRIPT).await
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), SurfaceError> {
        self.page
            .evaluate(SCROLL_SCRIPT)
            .await
            .map(|_| ())
            .map_err(|e| SurfaceError::Evaluate(e.to_string()))
    }

    async fn snapshot(&mut self) -> Result<String, SurfaceError> {
        self.page
            .content()
            .await
            .map_err(|e| SurfaceError::Snapshot(e.to_string()))
    }
}

#[async_trait]
impl BrowsingSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| SurfaceError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        wait_until_stable(&self.page, self.idle_quiet, self.idle_timeout).await;
        Ok(())
    }

    async fn click_if_present(&mut self, selector: &str) -> Result<bool, SurfaceError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| SurfaceError::Evaluate(e.to_string()))?;
        let Some(element) = elements.into_iter().next() else {
            return Ok(false);
        };
        element
            .click()
            .await
            .map_err(|e| SurfaceError::Evaluate(e.to_string()))?;
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), SurfaceError> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let result = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| SurfaceError::Close(e.to_string()));
        let _ = browser.wait().await;
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        info!("🛑 Browser session closed");
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Drop cannot await; if we're inside a tokio runtime, spawn a task to
        // close the browser to avoid zombie Chromium processes.
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        let task = self.handler_task.take();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            let _ = browser.close().await;
            let _ = browser.wait().await;
            if let Some(task) = task {
                task.abort();
            }
        });
    }
}
