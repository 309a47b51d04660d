#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vinted_harvest::progress::ProgressSink;
use vinted_harvest::scraping::extractor::{FieldExtractor, SelectorSet};
use vinted_harvest::scraping::{BrowsingSession, BrowsingSurface, SessionLauncher, SurfaceError};

pub const ORIGIN: &str = "https://www.vinted.es";

pub fn extractor() -> FieldExtractor {
    FieldExtractor::new(SelectorSet::default(), ORIGIN)
}

/// One listing card as the marketplace renders it.
pub fn card(id: usize, title: &str, price: &str) -> String {
    format!(
        r#"<div class="feed-grid__item">
  <a data-testid="product-item-id-{id}--overlay-link" href="/items/{id}-listing"></a>
  <img data-testid="product-item-id-{id}--image--img" src="https://images1.vinted.net/{id}.jpg"
       alt="{title}, marca: Zara, talla: M">
  <p data-testid="product-item-id-{id}--description-title">{title}</p>
  <p data-testid="product-item-id-{id}--description-subtitle">Muy bueno</p>
  <p data-testid="product-item-id-{id}--price-text">{price}</p>
</div>"#
    )
}

/// Feed page holding cards `1..=count`.
pub fn feed(count: usize) -> String {
    let cards: String = (1..=count)
        .map(|i| card(i, &format!("Prenda {i}"), &format!("{i},00 €")))
        .collect();
    format!(r#"<html><body><div class="feed-grid">{cards}</div></body></html>"#)
}

/// Scripted page: every scroll moves to the next `(height, html)` step and
/// stays on the last one once the script runs out.
#[derive(Debug, Clone)]
pub struct FakeSurface {
    steps: Vec<(u64, String)>,
    pos: usize,
    pub scrolls: usize,
}

impl FakeSurface {
    pub fn new(steps: Vec<(u64, String)>) -> Self {
        assert!(!steps.is_empty());
        Self {
            steps,
            pos: 0,
            scrolls: 0,
        }
    }
}

#[async_trait]
impl BrowsingSurface for FakeSurface {
    async fn content_height(&mut self) -> Result<u64, SurfaceError> {
        Ok(self.steps[self.pos].0)
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), SurfaceError> {
        self.scrolls += 1;
        self.pos = (self.pos + 1).min(self.steps.len() - 1);
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<String, SurfaceError> {
        Ok(self.steps[self.pos].1.clone())
    }
}

/// Counters shared between a launcher and the sessions it opened.
#[derive(Debug, Default)]
pub struct LaunchLog {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    /// `closes` observed at the start of each `open`.
    pub closes_seen_at_open: Mutex<Vec<usize>>,
    pub consent_clicks: AtomicUsize,
}

/// How the consent dialog behaves in a scripted session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Consent {
    #[default]
    Absent,
    Clicked,
    ClickFails,
}

pub struct FakeSession {
    surface: FakeSurface,
    fail_navigation: bool,
    consent: Consent,
    closed: bool,
    log: Arc<LaunchLog>,
}

#[async_trait]
impl BrowsingSurface for FakeSession {
    async fn content_height(&mut self) -> Result<u64, SurfaceError> {
        self.surface.content_height().await
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), SurfaceError> {
        self.surface.scroll_to_bottom().await
    }

    async fn snapshot(&mut self) -> Result<String, SurfaceError> {
        self.surface.snapshot().await
    }
}

#[async_trait]
impl BrowsingSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        if self.fail_navigation {
            return Err(SurfaceError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_TIMED_OUT".to_string(),
            });
        }
        Ok(())
    }

    async fn click_if_present(&mut self, selector: &str) -> Result<bool, SurfaceError> {
        match self.consent {
            Consent::Absent => Ok(false),
            Consent::Clicked => {
                self.log.consent_clicks.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            Consent::ClickFails => Err(SurfaceError::Evaluate(format!(
                "element `{}` is not clickable",
                selector
            ))),
        }
    }

    async fn close(&mut self) -> Result<(), SurfaceError> {
        if !self.closed {
            self.closed = true;
            self.log.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Opens sessions over `steps`; the first `failures` of them fail to navigate.
pub struct FakeLauncher {
    steps: Vec<(u64, String)>,
    failures: usize,
    consent: Consent,
    pub log: Arc<LaunchLog>,
}

impl FakeLauncher {
    pub fn new(steps: Vec<(u64, String)>, failures: usize) -> Self {
        Self {
            steps,
            failures,
            consent: Consent::Absent,
            log: Arc::new(LaunchLog::default()),
        }
    }

    pub fn with_consent(mut self, consent: Consent) -> Self {
        self.consent = consent;
        self
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn open(&self) -> Result<Box<dyn BrowsingSession>, SurfaceError> {
        let closes = self.log.closes.load(Ordering::SeqCst);
        if let Ok(mut seen) = self.log.closes_seen_at_open.lock() {
            seen.push(closes);
        }
        let n = self.log.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            surface: FakeSurface::new(self.steps.clone()),
            fail_navigation: n < self.failures,
            consent: self.consent,
            closed: false,
            log: Arc::clone(&self.log),
        }))
    }
}

/// Sink whose every update is rejected.
#[derive(Debug, Default)]
pub struct FailingSink {
    pub calls: AtomicUsize,
}

impl ProgressSink for FailingSink {
    fn report(&self, _: usize, _: usize, _: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("progress channel closed")
    }
}

/// Records every `(current, total, message)` update.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub updates: Mutex<Vec<(usize, usize, String)>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<(usize, usize, String)> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, current: usize, total: usize, message: &str) -> anyhow::Result<()> {
        self.updates
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push((current, total, message.to_string()));
        Ok(())
    }
}
