use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::scraping::extractor::{Lookup, SelectorSet};
use crate::scraping::harvest::DedupPolicy;
use crate::scraping::scroll::WaitRange;

// ---------------------------------------------------------------------------
// HarvestConfig: file-based config loader (vinted-harvest.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "VINTED_HARVEST_CONFIG";
pub const ENV_TARGET_URL: &str = "HARVEST_TARGET_URL";
pub const ENV_MAX_PRODUCTS: &str = "HARVEST_MAX_PRODUCTS";
pub const ENV_STALL_BUDGET: &str = "HARVEST_STALL_BUDGET";
pub const ENV_RETRIES: &str = "HARVEST_RETRIES";
pub const ENV_DATA_DIR: &str = "HARVEST_DATA_DIR";
pub const ENV_HEADLESS: &str = "HARVEST_HEADLESS";
pub const ENV_DEDUP: &str = "HARVEST_DEDUP";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

pub const DEFAULT_TARGET_URL: &str = "https://www.vinted.es/catalog";
pub const DEFAULT_MAX_PRODUCTS: usize = 100;
pub const DEFAULT_STALL_BUDGET: usize = 50;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_DATA_DIR: &str = "data";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

/// CSS selectors, one list per field. Each entry is either `"css"` (inner text)
/// or `"css@attribute"`. Omitted lists keep the built-in strategies.
#[derive(Deserialize, Default, Clone, Debug)]
pub struct SelectorOverrides {
    pub candidates: Option<String>,
    pub title: Option<Vec<String>>,
    pub price: Option<Vec<String>>,
    pub condition: Option<Vec<String>>,
    pub product_url: Option<Vec<String>>,
    pub image_url: Option<Vec<String>>,
    pub image_alt: Option<Vec<String>>,
    pub location: Option<Vec<String>>,
    pub consent: Option<String>,
}

/// Millisecond bounds for every timed wait of a run.
#[derive(Deserialize, Default, Clone, Debug)]
pub struct PacingConfig {
    /// After each scroll-to-bottom. Default: 2000..=4000.
    pub scroll_settle_ms: Option<(u64, u64)>,
    /// After navigation reached network idle. Default: 3000..=5000.
    pub page_settle_ms: Option<(u64, u64)>,
    /// After clicking the consent dialog. Default: 1000..=2000.
    pub consent_pause_ms: Option<(u64, u64)>,
    /// Between failed attempts. Default: 5000..=10000.
    pub retry_backoff_ms: Option<(u64, u64)>,
    /// Quiet period that counts as network idle. Default: 1500.
    pub idle_quiet_ms: Option<u64>,
    /// Upper bound for the network-idle wait. Default: 15000.
    pub idle_timeout_ms: Option<u64>,
}

impl PacingConfig {
    pub fn scroll_settle(&self) -> WaitRange {
        range_or(self.scroll_settle_ms, (2000, 4000))
    }

    pub fn page_settle(&self) -> WaitRange {
        range_or(self.page_settle_ms, (3000, 5000))
    }

    pub fn consent_pause(&self) -> WaitRange {
        range_or(self.consent_pause_ms, (1000, 2000))
    }

    pub fn retry_backoff(&self) -> WaitRange {
        range_or(self.retry_backoff_ms, (5000, 10_000))
    }

    pub fn idle_quiet(&self) -> Duration {
        Duration::from_millis(self.idle_quiet_ms.unwrap_or(1500))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.unwrap_or(15_000))
    }
}

fn range_or(value: Option<(u64, u64)>, default: (u64, u64)) -> WaitRange {
    let (min, max) = value.unwrap_or(default);
    WaitRange::from_millis(min, max)
}

/// Browser window / identity settings.
#[derive(Deserialize, Default, Clone, Debug)]
pub struct BrowserConfigSection {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub user_agent: Option<String>,
    /// Navigation timeout in seconds. Default: 60.
    pub navigation_timeout_secs: Option<u64>,
}

/// Top-level config loaded from `vinted-harvest.json`.
#[derive(Deserialize, Default, Clone, Debug)]
pub struct HarvestConfig {
    pub target_url: Option<String>,
    pub max_products: Option<usize>,
    pub stall_budget: Option<usize>,
    pub retries: Option<u32>,
    pub data_dir: Option<String>,
    pub headless: Option<bool>,
    pub dedup: Option<String>,
    /// Site origin used to absolutize relative product links.
    /// Defaults to the scheme + host of `target_url`.
    pub origin: Option<String>,
    /// Value written to `metadata.source`. Defaults to the target host without `www.`.
    pub source: Option<String>,
    #[serde(default)]
    pub selectors: SelectorOverrides,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub browser: BrowserConfigSection,
}

impl HarvestConfig {
    /// Target URL: JSON field → `HARVEST_TARGET_URL` → vinted.es catalog.
    pub fn resolve_target_url(&self) -> String {
        non_blank(self.target_url.as_deref())
            .or_else(|| env_string(ENV_TARGET_URL))
            .unwrap_or_else(|| DEFAULT_TARGET_URL.to_string())
    }

    /// Products per run: JSON field → `HARVEST_MAX_PRODUCTS` → 100.
    pub fn resolve_max_products(&self) -> usize {
        self.max_products
            .or_else(|| env_parse(ENV_MAX_PRODUCTS))
            .unwrap_or(DEFAULT_MAX_PRODUCTS)
    }

    /// Consecutive no-growth scrolls before giving up: JSON → `HARVEST_STALL_BUDGET` → 50.
    pub fn resolve_stall_budget(&self) -> usize {
        self.stall_budget
            .or_else(|| env_parse(ENV_STALL_BUDGET))
            .unwrap_or(DEFAULT_STALL_BUDGET)
            .max(1)
    }

    /// Session attempts: JSON → `HARVEST_RETRIES` → 3. Never below 1.
    pub fn resolve_retries(&self) -> u32 {
        self.retries
            .or_else(|| env_parse(ENV_RETRIES))
            .unwrap_or(DEFAULT_RETRIES)
            .max(1)
    }

    pub fn resolve_data_dir(&self) -> PathBuf {
        non_blank(self.data_dir.as_deref())
            .or_else(|| env_string(ENV_DATA_DIR))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Headless mode: JSON → `HARVEST_HEADLESS` (1/true/yes/on) → `false` (visible window).
    pub fn resolve_headless(&self) -> bool {
        if let Some(b) = self.headless {
            return b;
        }
        env_string(ENV_HEADLESS)
            .map(|v| truthy(&v))
            .unwrap_or(false)
    }

    pub fn resolve_dedup(&self) -> DedupPolicy {
        non_blank(self.dedup.as_deref())
            .or_else(|| env_string(ENV_DEDUP))
            .and_then(|v| DedupPolicy::parse(&v))
            .unwrap_or_default()
    }

    /// Origin for relative hrefs: JSON → scheme+host of the target URL.
    pub fn resolve_origin(&self) -> String {
        if let Some(o) = non_blank(self.origin.as_deref()) {
            return o.trim_end_matches('/').to_string();
        }
        origin_of(&self.resolve_target_url())
            .unwrap_or_else(|| origin_of(DEFAULT_TARGET_URL).unwrap_or_default())
    }

    pub fn resolve_source(&self) -> String {
        non_blank(self.source.as_deref()).unwrap_or_else(|| source_of(&self.resolve_target_url()))
    }

    pub fn resolve_viewport(&self) -> (u32, u32) {
        (
            self.browser.width.unwrap_or(1920),
            self.browser.height.unwrap_or(1080),
        )
    }

    pub fn resolve_user_agent(&self) -> String {
        non_blank(self.browser.user_agent.as_deref())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn resolve_navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.navigation_timeout_secs.unwrap_or(60))
    }

    pub fn resolve_consent_selector(&self) -> String {
        non_blank(self.selectors.consent.as_deref()).unwrap_or_else(|| {
            r#"[data-testid="cookie-accept"], .cookie-notice__button"#.to_string()
        })
    }

    /// Built-in selector strategies with the per-field overrides applied.
    pub fn resolve_selectors(&self) -> SelectorSet {
        let mut set = SelectorSet::default();
        let o = &self.selectors;
        if let Some(c) = non_blank(o.candidates.as_deref()) {
            set.candidates = c;
        }
        override_lookups(&mut set.title, &o.title);
        override_lookups(&mut set.price, &o.price);
        override_lookups(&mut set.condition, &o.condition);
        override_lookups(&mut set.product_url, &o.product_url);
        override_lookups(&mut set.image_url, &o.image_url);
        override_lookups(&mut set.image_alt, &o.image_alt);
        override_lookups(&mut set.location, &o.location);
        set
    }
}

fn override_lookups(slot: &mut Vec<Lookup>, specs: &Option<Vec<String>>) {
    if let Some(specs) = specs {
        let parsed: Vec<Lookup> = specs.iter().filter_map(|s| Lookup::parse(s)).collect();
        if !parsed.is_empty() {
            *slot = parsed;
        }
    }
}

/// `https://www.vinted.es/catalog?x=1` → `https://www.vinted.es`.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// `https://www.vinted.es/catalog` → `vinted.es`.
pub fn source_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn non_blank(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Load `vinted-harvest.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `VINTED_HARVEST_CONFIG` env var path
/// 2. `./vinted-harvest.json`
/// 3. `~/.vinted-harvest/config.json`
///
/// Missing file → `HarvestConfig::default()` (silent, env-var fallbacks apply).
/// Parse error → log a warning, return `HarvestConfig::default()`.
pub fn load_harvest_config() -> HarvestConfig {
    let mut candidates = vec![PathBuf::from("vinted-harvest.json")];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".vinted-harvest").join("config.json"));
    }

    for path in &candidates {
        if let Some(cfg) = load_from(path) {
            return cfg;
        }
    }

    HarvestConfig::default()
}

fn load_from(path: &Path) -> Option<HarvestConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<HarvestConfig>(&contents) {
        Ok(cfg) => {
            tracing::info!("harvest config loaded from {}", path.display());
            Some(cfg)
        }
        Err(e) => {
            tracing::warn!(
                "harvest config parse error at {}: {} (using defaults)",
                path.display(),
                e
            );
            Some(HarvestConfig::default())
        }
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` is set to an existing path;
/// otherwise discovery falls through to `browser_manager::find_chrome_executable()`.
pub fn chrome_executable_override() -> Option<String> {
    let p = env_string(ENV_CHROME_EXECUTABLE)?;
    Path::new(&p).exists().then_some(p)
}
