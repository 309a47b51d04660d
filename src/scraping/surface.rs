//! Seams between the harvest logic and the live browser.
//!
//! The harvest loop only ever talks to a [`BrowsingSurface`]; the session
//! manager additionally drives a [`BrowsingSession`] obtained from a
//! [`SessionLauncher`]. The Chromium implementations live in
//! `browser_manager.rs`; tests plug in scripted fakes.

use async_trait::async_trait;
use thiserror::Error;

use super::extractor::ExtractError;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("script evaluation failed: {0}")]
    Evaluate(String),

    #[error("page snapshot failed: {0}")]
    Snapshot(String),

    #[error("session close failed: {0}")]
    Close(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// The live document a harvest scrolls and queries.
#[async_trait]
pub trait BrowsingSurface: Send {
    /// Current scrollable content height in CSS pixels.
    async fn content_height(&mut self) -> Result<u64, SurfaceError>;

    async fn scroll_to_bottom(&mut self) -> Result<(), SurfaceError>;

    /// Rendered HTML of the whole document as it stands right now.
    async fn snapshot(&mut self) -> Result<String, SurfaceError>;
}

/// One opened browser session: a surface plus navigation and teardown.
#[async_trait]
pub trait BrowsingSession: BrowsingSurface {
    /// Navigate and return once the network has gone idle.
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError>;

    /// Click the first element matching `selector`. `Ok(false)` when absent.
    async fn click_if_present(&mut self, selector: &str) -> Result<bool, SurfaceError>;

    /// Release every browser resource. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), SurfaceError>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowsingSession>, SurfaceError>;
}
