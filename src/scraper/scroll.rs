//! Scroll-to-stability loop.
//!
//! The page is scrolled to the bottom repeatedly until the content signal
//! reads the same value `stability_threshold` times in a row (converged), or
//! until the iteration or wall-clock bound is hit. Hitting a bound is a
//! normal way to finish: infinite feeds are cut off, not reported as errors.

use crate::browser::{ContentSignal, PageDriver};
use crate::config::ScrollSettings;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365);

#[derive(Debug, Clone)]
pub struct ScrollPolicy {
    /// Consecutive identical reads needed to call the page loaded (K).
    pub stability_threshold: u32,
    pub max_iterations: u32,
    pub settle_interval: Duration,
    pub max_elapsed: Duration,
    pub load_more_selectors: Vec<String>,
    /// Visible labels of load-more buttons and links, matched case-insensitively.
    pub load_more_texts: Vec<String>,
}

impl From<&ScrollSettings> for ScrollPolicy {
    fn from(settings: &ScrollSettings) -> Self {
        Self {
            stability_threshold: settings.stability_threshold.max(1),
            max_iterations: settings.max_iterations,
            settle_interval: Duration::from_millis(settings.settle_interval_ms),
            max_elapsed: Duration::from_secs(settings.max_elapsed_secs),
            load_more_selectors: settings.load_more_selectors.clone(),
            load_more_texts: settings.load_more_texts.clone(),
        }
    }
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self::from(&ScrollSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    Converged,
    IterationBound,
    TimeBound,
    /// The driver stopped answering; extraction proceeds with what is loaded.
    DriverError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub stop: ScrollStop,
    pub iterations: u32,
    pub measurements: u32,
    pub last_signal: Option<u64>,
}

/// Pure termination bookkeeping, fed one measurement at a time.
#[derive(Debug)]
pub struct ScrollTracker {
    threshold: u32,
    max_iterations: u32,
    max_elapsed: Duration,
    started: Instant,
    last: Option<u64>,
    run: u32,
    iterations: u32,
    measurements: u32,
}

impl ScrollTracker {
    pub fn new(policy: &ScrollPolicy, started: Instant) -> Self {
        Self {
            threshold: policy.stability_threshold.max(1),
            max_iterations: policy.max_iterations,
            max_elapsed: policy.max_elapsed,
            started,
            last: None,
            run: 0,
            iterations: 0,
            measurements: 0,
        }
    }

    pub fn begin_iteration(&mut self) {
        self.iterations += 1;
    }

    /// Records a reading and says whether the loop should stop.
    /// Convergence is checked before the safety bounds.
    pub fn observe(&mut self, signal: u64, now: Instant) -> Option<ScrollStop> {
        self.measurements += 1;
        if self.last == Some(signal) {
            self.run += 1;
        } else {
            self.last = Some(signal);
            self.run = 1;
        }

        if self.run >= self.threshold {
            Some(ScrollStop::Converged)
        } else if self.iterations >= self.max_iterations {
            Some(ScrollStop::IterationBound)
        } else if now.duration_since(self.started) >= self.max_elapsed {
            Some(ScrollStop::TimeBound)
        } else {
            None
        }
    }

    /// True when the latest reading repeated the previous one.
    pub fn unchanged(&self) -> bool {
        self.run > 1
    }

    pub fn outcome(&self, stop: ScrollStop) -> ScrollOutcome {
        ScrollOutcome {
            stop,
            iterations: self.iterations,
            measurements: self.measurements,
            last_signal: self.last,
        }
    }
}

fn finish(tracker: &ScrollTracker, stop: ScrollStop) -> ScrollOutcome {
    let outcome = tracker.outcome(stop);
    match stop {
        ScrollStop::Converged => info!(
            "Content stable after {} scroll(s), signal {:?}",
            outcome.iterations, outcome.last_signal
        ),
        ScrollStop::IterationBound | ScrollStop::TimeBound => info!(
            "Scroll safety bound reached ({:?}) after {} scroll(s), signal {:?}",
            stop, outcome.iterations, outcome.last_signal
        ),
        ScrollStop::DriverError => warn!(
            "Scrolling interrupted after {} scroll(s)",
            outcome.iterations
        ),
    }
    outcome
}

/// Clicks the first load-more control found by selector, then by label.
async fn click_load_more(page: &dyn PageDriver, policy: &ScrollPolicy) {
    if !policy.load_more_selectors.is_empty() {
        match page.click_first(&policy.load_more_selectors).await {
            Ok(Some(selector)) => {
                info!("Clicked load-more control '{}'", selector);
                return;
            }
            Ok(None) => {}
            Err(e) => debug!("Load-more click failed: {}", e),
        }
    }
    if !policy.load_more_texts.is_empty() {
        match page.click_text(&policy.load_more_texts).await {
            Ok(Some(text)) => info!("Clicked load-more control labelled '{}'", text),
            Ok(None) => {}
            Err(e) => debug!("Load-more click by label failed: {}", e),
        }
    }
}

/// Runs the loop on `page`. Never fails; driver errors end it early.
/// Every wait and driver call is bounded by `max_elapsed` from the start.
pub async fn scroll_until_stable(
    page: &dyn PageDriver,
    signal: &ContentSignal,
    policy: &ScrollPolicy,
) -> ScrollOutcome {
    let started = Instant::now();
    let deadline = started
        .checked_add(policy.max_elapsed)
        .unwrap_or_else(|| started + FAR_FUTURE);
    let mut tracker = ScrollTracker::new(policy, started);

    let first = match timeout_at(deadline, page.measure_content_signal(signal)).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("Initial content measurement failed: {}", e);
            return finish(&tracker, ScrollStop::DriverError);
        }
        Err(_) => return finish(&tracker, ScrollStop::TimeBound),
    };
    debug!("Initial content signal: {}", first);
    if let Some(stop) = tracker.observe(first, Instant::now()) {
        return finish(&tracker, stop);
    }

    loop {
        tracker.begin_iteration();
        match timeout_at(deadline, page.scroll_to_bottom()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Scroll failed: {}", e);
                return finish(&tracker, ScrollStop::DriverError);
            }
            Err(_) => return finish(&tracker, ScrollStop::TimeBound),
        }
        sleep_until((Instant::now() + policy.settle_interval).min(deadline)).await;

        let value = match timeout_at(deadline, page.measure_content_signal(signal)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("Content measurement failed: {}", e);
                return finish(&tracker, ScrollStop::DriverError);
            }
            Err(_) => return finish(&tracker, ScrollStop::TimeBound),
        };
        debug!("Scroll {}: content signal {}", tracker.iterations, value);

        if let Some(stop) = tracker.observe(value, Instant::now()) {
            return finish(&tracker, stop);
        }

        if tracker.unchanged() && timeout_at(deadline, click_load_more(page, policy)).await.is_err() {
            return finish(&tracker, ScrollStop::TimeBound);
        }
    }
}
