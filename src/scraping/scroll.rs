//! Scroll Driver: one scroll-to-bottom step with a randomized settle wait.

use std::time::Duration;

use rand::distr::{Distribution, Uniform};
use tracing::debug;

use super::surface::{BrowsingSurface, SurfaceError};

/// Inclusive bounds for a randomized wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitRange {
    min: Duration,
    max: Duration,
}

impl WaitRange {
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        let (lo, hi) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        Self {
            min: Duration::from_millis(lo),
            max: Duration::from_millis(hi),
        }
    }

    /// No wait at all. Used by tests and by callers that pace externally.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw one duration uniformly from `[min, max]`.
    pub fn sample(&self) -> Duration {
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        let mut rng = rand::rng();
        let ms = Uniform::new_inclusive(lo, hi)
            .map(|dist| dist.sample(&mut rng))
            .unwrap_or(lo);
        Duration::from_millis(ms)
    }

    pub async fn wait(&self) {
        let d = self.sample();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

/// Heights measured around one scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthOutcome {
    pub before: u64,
    pub after: u64,
}

impl GrowthOutcome {
    pub fn grew(&self) -> bool {
        self.after > self.before
    }

    pub fn stalled(&self) -> bool {
        !self.grew()
    }
}

#[derive(Debug, Clone)]
pub struct ScrollDriver {
    settle: WaitRange,
}

impl ScrollDriver {
    pub fn new(settle: WaitRange) -> Self {
        Self { settle }
    }

    /// Scroll to the bottom, let lazy content render, report whether the
    /// document got taller. Reads no records.
    pub async fn grow<S>(&self, surface: &mut S) -> Result<GrowthOutcome, SurfaceError>
    where
        S: BrowsingSurface + ?Sized,
    {
        let before = surface.content_height().await?;
        surface.scroll_to_bottom().await?;
        self.settle.wait().await;
        let after = surface.content_height().await?;

        let outcome = GrowthOutcome { before, after };
        debug!(before, after, grew = outcome.grew(), "scroll step");
        Ok(outcome)
    }
}
