use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::sample::TelemetrySample;

// Live samples held back while waiting for the historical load
const MAX_PENDING: usize = 512;

/// Longest coverage an operator may configure.
pub const MAX_COVERAGE_DAYS: u32 = 366;

/// The window as seen by event handlers. Subscriptions keep a clone of the `Arc`
/// and read the current contents at call time.
pub type SharedWindow = Arc<RwLock<TelemetryWindow>>;

#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Held until `initialize` runs.
    Buffered,
    Appended { evicted: Option<TelemetrySample> },
    /// Timestamp was not after the current tail; the window is unchanged.
    Rejected,
}

/// Time ordered, coverage limited view of recent telemetry.
///
/// Filled once by a historical bulk load and then by single live appends. Each
/// append evicts at most one head sample, so a burst of live samples after a long
/// gap can leave the span over the coverage duration for a while.
#[derive(Debug)]
pub struct TelemetryWindow {
    coverage: Duration,
    samples: VecDeque<TelemetrySample>,
    pending: VecDeque<TelemetrySample>,
    initialized: bool,
}

impl TelemetryWindow {
    pub fn new(coverage: Duration) -> Self {
        Self {
            coverage,
            samples: VecDeque::new(),
            pending: VecDeque::new(),
            initialized: false,
        }
    }

    pub fn with_days(days: u32) -> Self {
        Self::new(Duration::days(days as i64))
    }

    pub fn shared(self) -> SharedWindow {
        Arc::new(RwLock::new(self))
    }

    pub fn coverage(&self) -> Duration {
        self.coverage
    }

    pub fn coverage_days(&self) -> u32 {
        self.coverage.num_days().max(0) as u32
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Replaces the contents with a historical batch, then replays any live
    /// samples that arrived while the batch was being fetched.
    pub fn initialize(&mut self, batch: Vec<TelemetrySample>) {
        self.samples.clear();
        for sample in batch {
            if let Some(last) = self.samples.back() {
                if !sample.has_time_after(last) {
                    warn!(
                        "historical batch out of order: {} after {}, dropped",
                        sample.time, last.time
                    );
                    continue;
                }
            }
            self.samples.push_back(sample);
        }
        self.initialized = true;
        debug!("telemetry window initialized with {} samples", self.samples.len());

        let pending: Vec<TelemetrySample> = self.pending.drain(..).collect();
        for sample in pending {
            self.push(sample);
        }
    }

    pub fn append(&mut self, sample: TelemetrySample) -> AppendOutcome {
        if !self.initialized {
            if self.pending.len() >= MAX_PENDING {
                if let Some(dropped) = self.pending.pop_front() {
                    warn!("live buffer full, dropping sample at {}", dropped.time);
                }
            }
            self.pending.push_back(sample);
            return AppendOutcome::Buffered;
        }
        self.push(sample)
    }

    fn push(&mut self, sample: TelemetrySample) -> AppendOutcome {
        if let Some(last) = self.samples.back() {
            if !sample.has_time_after(last) {
                warn!(
                    "rejecting live sample at {}: tail is already at {}",
                    sample.time, last.time
                );
                return AppendOutcome::Rejected;
            }
        }

        // No threshold when the coverage reaches back past the representable range
        let threshold = sample.time.checked_sub_signed(self.coverage);
        let evicted = match (self.samples.front(), threshold) {
            (Some(first), Some(threshold)) if first.time < threshold => self.samples.pop_front(),
            _ => None,
        };
        self.samples.push_back(sample);
        AppendOutcome::Appended { evicted }
    }

    /// Switches to a new coverage duration. Held samples stay visible until the
    /// next `initialize`; live appends are buffered meanwhile.
    pub fn reconfigure_coverage(&mut self, coverage: Duration) {
        self.coverage = coverage;
        self.initialized = false;
    }

    /// Session end.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.pending.clear();
        self.initialized = false;
    }

    pub fn samples(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }

    pub fn snapshot(&self) -> Vec<TelemetrySample> {
        self.samples.iter().cloned().collect()
    }

    pub fn first(&self) -> Option<&TelemetrySample> {
        self.samples.front()
    }

    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn span(&self) -> Option<Duration> {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => Some(last.time - first.time),
            _ => None,
        }
    }
}
