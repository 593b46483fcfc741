use std::time::Duration;

use stampede_metrics::Registry;

use crate::thresholds::{ThresholdSet, parse_threshold_expr};

#[derive(Debug, Clone)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Immutable run shape, built once from external configuration before any
/// traffic is generated.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Flat VU count. Ignored when `stages` is non-empty.
    pub vus: u64,
    /// Total run duration for the flat shape. Ramped runs derive their
    /// duration from the stages.
    pub duration: Duration,
    /// Optional ramp stages; a non-empty list replaces the flat shape.
    pub stages: Vec<Stage>,
    pub thresholds: Vec<ThresholdSet>,
    /// Probability of taking the weighted branch inside one iteration.
    pub branch_probability: f64,
    /// Pacing delay between a VU's iterations.
    pub think_time: Duration,
    /// Per-request timeout applied by the executor.
    pub request_timeout: Duration,
    /// Stop the run early when a periodic threshold evaluation fails.
    /// Off by default: an early stop would itself distort the other metrics.
    pub abort_on_threshold_fail: bool,
    pub threshold_eval_interval: Duration,
    /// Opaque key/value pairs handed to the scenario's setup step.
    pub credentials: Vec<(String, String)>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            vus: 1,
            duration: Duration::from_secs(10),
            stages: Vec::new(),
            thresholds: Vec::new(),
            branch_probability: 0.0,
            think_time: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            abort_on_threshold_fail: false,
            threshold_eval_interval: Duration::from_secs(5),
            credentials: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("`duration` must be positive")]
    InvalidDuration,

    #[error("`branch_probability` must be within [0, 1], got {0}")]
    BranchProbabilityOutOfRange(f64),

    #[error("`stages` must have a positive total duration")]
    InvalidStages,

    #[error("`request_timeout` must be positive")]
    InvalidRequestTimeout,

    #[error("threshold references unknown metric `{metric}`")]
    UnknownThresholdMetric { metric: String },

    #[error("invalid threshold expression for metric `{metric}`: {error}")]
    InvalidThresholdExpr { metric: String, error: String },
}

impl WorkloadConfig {
    /// Fail-fast validation against the fully registered metric stream.
    /// Called by the run controller after engine and scenario metrics are
    /// registered and before any VU is spawned.
    pub fn validate(&self, metrics: &Registry) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            if self.duration.is_zero() {
                return Err(ConfigError::InvalidDuration);
            }
        } else if self
            .stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
            .is_zero()
        {
            return Err(ConfigError::InvalidStages);
        }

        if !(0.0..=1.0).contains(&self.branch_probability) {
            return Err(ConfigError::BranchProbabilityOutOfRange(
                self.branch_probability,
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidRequestTimeout);
        }

        for set in &self.thresholds {
            if !metrics.contains(&set.metric) {
                return Err(ConfigError::UnknownThresholdMetric {
                    metric: set.metric.clone(),
                });
            }
            for raw in &set.expressions {
                parse_threshold_expr(raw).map_err(|error| ConfigError::InvalidThresholdExpr {
                    metric: set.metric.clone(),
                    error,
                })?;
            }
        }

        Ok(())
    }

    /// Total run duration for the configured shape.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        if self.stages.is_empty() {
            self.duration
        } else {
            self.stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
        }
    }
}
