use std::time::Duration;

use stampede_metrics::MetricSeriesSummary;

use crate::thresholds::{ThresholdResult, all_passed};

/// Everything a completed run produced: the final metric snapshot, the
/// verdict of every threshold expression, and how the run ended.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub scenario: &'static str,
    /// Wall-clock time between the start latch firing and the last user
    /// finishing.
    pub elapsed: Duration,
    pub metrics: Vec<MetricSeriesSummary>,
    pub thresholds: Vec<ThresholdResult>,
    /// When a periodic evaluation first saw a failing threshold.
    pub first_breach_at: Option<Duration>,
    /// The run was cut short by `abort_on_threshold_fail`.
    pub aborted: bool,
}

impl RunReport {
    /// Overall verdict: every threshold holds against the final snapshot and
    /// the run was not aborted on a breach.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.aborted && all_passed(&self.thresholds)
    }

    #[must_use]
    pub fn series(&self, name: &str) -> Option<&MetricSeriesSummary> {
        self.metrics
            .iter()
            .find(|s| s.name == name && s.endpoint.is_none())
    }
}
