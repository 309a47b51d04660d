//! Session Manager: open → navigate → consent → harvest → close, retried
//! with a randomized backoff.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use super::extractor::FieldExtractor;
use super::harvest::{DedupPolicy, HarvestOutcome, Harvester, DEFAULT_STALL_BUDGET};
use super::scroll::{ScrollDriver, WaitRange};
use super::surface::{BrowsingSession, SessionLauncher, SurfaceError};
use crate::core::config::HarvestConfig;
use crate::features::progress::{notify, ProgressSink};

#[derive(Debug, Error)]
#[error("harvest failed after {attempts} attempt(s): {last_error}")]
pub struct HarvestFailure {
    pub attempts: u32,
    pub last_error: SurfaceError,
}

/// Run `op` up to `attempts` times (at least once), sleeping a sample of
/// `backoff` between failures. Returns the last error once exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    attempts: u32,
    backoff: &WaitRange,
    mut op: F,
) -> Result<T, (u32, E)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                error!("Attempt {}/{} failed: {}. No retries left", attempt, attempts, e);
                return Err((attempt, e));
            }
            Err(e) => {
                warn!("Attempt {}/{} failed: {}. Retrying", attempt, attempts, e);
                backoff.wait().await;
                attempt += 1;
            }
        }
    }
}

/// Timing for one session.
#[derive(Debug, Clone)]
pub struct SessionPacing {
    pub page_settle: WaitRange,
    pub consent_pause: WaitRange,
    pub retry_backoff: WaitRange,
}

impl SessionPacing {
    pub fn zero() -> Self {
        Self {
            page_settle: WaitRange::zero(),
            consent_pause: WaitRange::zero(),
            retry_backoff: WaitRange::zero(),
        }
    }
}

/// Wraps one harvest run in session setup/teardown and bounded retry.
pub struct SessionManager {
    launcher: Arc<dyn SessionLauncher>,
    extractor: FieldExtractor,
    driver: ScrollDriver,
    pacing: SessionPacing,
    consent_selector: String,
    policy: DedupPolicy,
    retries: u32,
    stall_budget: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn SessionLauncher>, extractor: FieldExtractor, driver: ScrollDriver) -> Self {
        Self {
            launcher,
            extractor,
            driver,
            pacing: SessionPacing::zero(),
            consent_selector: String::new(),
            policy: DedupPolicy::default(),
            retries: 3,
            stall_budget: DEFAULT_STALL_BUDGET,
            cancel: None,
        }
    }

    /// Build a manager with every knob taken from `config`.
    pub fn from_config(launcher: Arc<dyn SessionLauncher>, config: &HarvestConfig) -> Self {
        let extractor = FieldExtractor::new(config.resolve_selectors(), config.resolve_origin());
        let driver = ScrollDriver::new(config.pacing.scroll_settle());
        Self::new(launcher, extractor, driver)
            .with_pacing(SessionPacing {
                page_settle: config.pacing.page_settle(),
                consent_pause: config.pacing.consent_pause(),
                retry_backoff: config.pacing.retry_backoff(),
            })
            .with_consent_selector(config.resolve_consent_selector())
            .with_policy(config.resolve_dedup())
            .with_retries(config.resolve_retries())
            .with_stall_budget(config.resolve_stall_budget())
    }

    pub fn with_pacing(mut self, pacing: SessionPacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_consent_selector(mut self, selector: impl Into<String>) -> Self {
        self.consent_selector = selector.into();
        self
    }

    pub fn with_policy(mut self, policy: DedupPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_stall_budget(mut self, stall_budget: usize) -> Self {
        self.stall_budget = stall_budget.max(1);
        self
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Harvest up to `target` products from `url`. Fails only after every
    /// attempt has failed.
    pub async fn run(
        &self,
        url: &str,
        target: usize,
        progress: &dyn ProgressSink,
    ) -> Result<HarvestOutcome, HarvestFailure> {
        let outcome = retry_with_backoff(self.retries, &self.pacing.retry_backoff, |attempt| {
            info!("🚀 Starting harvest (attempt {}/{})", attempt, self.retries);
            self.attempt(url, target, progress)
        })
        .await
        .map_err(|(attempts, last_error)| HarvestFailure {
            attempts,
            last_error,
        })?;

        info!("✅ Harvest complete: {} products", outcome.products.len());
        Ok(outcome)
    }

    /// One attempt. The session is closed on every exit path.
    async fn attempt(
        &self,
        url: &str,
        target: usize,
        progress: &dyn ProgressSink,
    ) -> Result<HarvestOutcome, SurfaceError> {
        notify(progress, 0, target, "Launching browser...");
        let mut session = self.launcher.open().await?;

        let result = self.drive(session.as_mut(), url, target, progress).await;

        if let Err(e) = session.close().await {
            warn!("Session close error (non-fatal): {}", e);
        }
        result
    }

    async fn drive(
        &self,
        session: &mut dyn BrowsingSession,
        url: &str,
        target: usize,
        progress: &dyn ProgressSink,
    ) -> Result<HarvestOutcome, SurfaceError> {
        notify(progress, 0, target, "Loading page...");
        info!("🌐 Navigating to: {}", url);
        session.navigate(url).await?;
        self.pacing.page_settle.wait().await;

        if !self.consent_selector.is_empty() {
            match session.click_if_present(&self.consent_selector).await {
                Ok(true) => {
                    info!("Consent dialog dismissed");
                    self.pacing.consent_pause.wait().await;
                }
                Ok(false) => {}
                Err(e) => warn!("Consent dialog click failed (ignored): {}", e),
            }
        }

        notify(progress, 0, target, "Extracting products...");
        let mut harvester =
            Harvester::new(&self.extractor, &self.driver, progress).with_policy(self.policy);
        if let Some(flag) = self.cancel.as_deref() {
            harvester = harvester.with_cancel(flag);
        }
        harvester.harvest(session, target, self.stall_budget).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn retry_stops_at_first_success() {
        let calls = Cell::new(0u32);
        let result: Result<u32, (u32, String)> =
            retry_with_backoff(5, &WaitRange::zero(), |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 2 {
                        Err(format!("boom {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn retry_reports_last_error_when_exhausted() {
        let result: Result<(), (u32, String)> =
            retry_with_backoff(3, &WaitRange::zero(), |attempt| async move {
                Err(format!("boom {attempt}"))
            })
            .await;
        assert_eq!(result, Err((3, "boom 3".to_string())));
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let result: Result<(), (u32, String)> =
            retry_with_backoff(0, &WaitRange::zero(), |_| async { Err("nope".to_string()) })
                .await;
        assert_eq!(result, Err((1, "nope".to_string())));
    }
}
