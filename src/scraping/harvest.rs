//! The harvest loop: scroll, scan the new cards, dedup, repeat until the
//! target is reached or the page stops growing.
//!
//! Convergence cannot be known up front (the feed size is server-controlled),
//! so the loop keeps scrolling until `stall_budget` consecutive scrolls fail
//! to grow the document.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, info};

use super::extractor::FieldExtractor;
use super::scroll::ScrollDriver;
use super::surface::{BrowsingSurface, SurfaceError};
use crate::features::progress::{notify, ProgressSink};
use crate::types::Product;

pub const DEFAULT_STALL_BUDGET: usize = 50;

/// What makes two records "the same listing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Every field equal, timestamp included.
    #[default]
    Record,
    /// Same product address; records without one fall back to `Record`.
    ProductUrl,
}

impl DedupPolicy {
    pub fn parse(v: &str) -> Option<Self> {
        match v.trim().to_ascii_lowercase().as_str() {
            "record" | "full" => Some(Self::Record),
            "product_url" | "url" => Some(Self::ProductUrl),
            _ => None,
        }
    }

    fn same(&self, a: &Product, b: &Product) -> bool {
        match self {
            Self::ProductUrl if !a.product_url.is_empty() => a.product_url == b.product_url,
            _ => a == b,
        }
    }
}

/// Accepted records in discovery order. Linear-scan membership; fine at the
/// few-hundred-record scale of one run.
#[derive(Debug, Default)]
pub struct DedupSet {
    policy: DedupPolicy,
    accepted: Vec<Product>,
}

impl DedupSet {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            accepted: Vec::new(),
        }
    }

    /// Append `record` unless an equal one was already accepted.
    pub fn accept(&mut self, record: Product) -> bool {
        if self.accepted.iter().any(|seen| self.policy.same(seen, &record)) {
            return false;
        }
        self.accepted.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn last(&self) -> Option<&Product> {
        self.accepted.last()
    }

    pub fn into_vec(self) -> Vec<Product> {
        self.accepted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestState {
    Scrolling,
    Extracting,
    /// Target count reached.
    Converged,
    /// Stall budget exhausted; the feed had fewer items than requested.
    StalledOut,
    /// Shutdown flag observed between iterations.
    Cancelled,
}

/// Mutable accumulator owned by one running harvest.
#[derive(Debug)]
pub struct HarvestSession {
    records: DedupSet,
    stalls: usize,
    scanned: usize,
    scrolls: usize,
    target: usize,
    stall_budget: usize,
    state: HarvestState,
}

impl HarvestSession {
    pub fn new(target: usize, stall_budget: usize, policy: DedupPolicy) -> Self {
        Self {
            records: DedupSet::new(policy),
            stalls: 0,
            scanned: 0,
            scrolls: 0,
            target,
            stall_budget: stall_budget.max(1),
            state: HarvestState::Scrolling,
        }
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn target_reached(&self) -> bool {
        self.records.len() >= self.target
    }

    fn keep_going(&self) -> bool {
        !self.target_reached() && self.stalls < self.stall_budget
    }

    fn record_growth(&mut self, grew: bool) {
        if grew {
            self.stalls = 0;
        } else {
            self.stalls += 1;
        }
    }

    fn finish(self) -> HarvestOutcome {
        HarvestOutcome {
            products: self.records.into_vec(),
            state: self.state,
            scrolls: self.scrolls,
        }
    }
}

#[derive(Debug)]
pub struct HarvestOutcome {
    pub products: Vec<Product>,
    pub state: HarvestState,
    pub scrolls: usize,
}

/// Orchestrates the scroll driver, the extractor and the dedup set.
pub struct Harvester<'a> {
    extractor: &'a FieldExtractor,
    driver: &'a ScrollDriver,
    progress: &'a dyn ProgressSink,
    policy: DedupPolicy,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Harvester<'a> {
    pub fn new(
        extractor: &'a FieldExtractor,
        driver: &'a ScrollDriver,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            extractor,
            driver,
            progress,
            policy: DedupPolicy::default(),
            cancel: None,
        }
    }

    pub fn with_policy(mut self, policy: DedupPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Run the loop until `target` records are accepted or `stall_budget`
    /// consecutive scrolls produce no growth. Both endings are successes;
    /// only surface failures are returned as errors.
    pub async fn harvest<S>(
        &self,
        surface: &mut S,
        target: usize,
        stall_budget: usize,
    ) -> Result<HarvestOutcome, SurfaceError>
    where
        S: BrowsingSurface + ?Sized,
    {
        let mut session = HarvestSession::new(target, stall_budget, self.policy);

        while session.keep_going() {
            if self.cancelled() {
                info!("Harvest cancelled after {} products", session.len());
                session.state = HarvestState::Cancelled;
                return Ok(session.finish());
            }

            session.state = HarvestState::Scrolling;
            let growth = self.driver.grow(surface).await?;
            session.scrolls += 1;

            session.state = HarvestState::Extracting;
            let html = surface.snapshot().await?;
            self.absorb(&mut session, &html)?;

            session.record_growth(growth.grew());
            if growth.stalled() {
                info!(
                    "No new content. Attempt {}/{}",
                    session.stalls, session.stall_budget
                );
            }
        }

        session.state = if session.target_reached() {
            HarvestState::Converged
        } else {
            HarvestState::StalledOut
        };
        info!(
            state = ?session.state,
            scrolls = session.scrolls,
            "Harvest finished with {} products",
            session.len()
        );
        Ok(session.finish())
    }

    /// Extract the not-yet-scanned cards of one snapshot into the session.
    fn absorb(&self, session: &mut HarvestSession, html: &str) -> Result<(), SurfaceError> {
        let scraped_at = Utc::now().to_rfc3339();
        let scan = self.extractor.scan(html, session.scanned, &scraped_at)?;
        debug!(
            candidates = scan.candidates,
            fresh = scan.extracted.len(),
            "snapshot scanned"
        );

        for record in scan.extracted {
            if session.target_reached() {
                break;
            }
            session.scanned += 1;
            let Some(record) = record else { continue };
            if session.records.accept(record) {
                let title = session
                    .records
                    .last()
                    .map(|p| p.title.chars().take(50).collect::<String>())
                    .unwrap_or_default();
                notify(
                    self.progress,
                    session.len(),
                    session.target,
                    &format!("Extracted: {}", title),
                );
            }
        }
        Ok(())
    }
}
