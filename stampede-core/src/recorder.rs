use std::sync::Arc;
use std::time::Duration;

use stampede_metrics::{MetricHandle, MetricKind, Registry};

use crate::executor::RequestOutcome;

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";
pub const VU_FAULTS: &str = "vu_faults";

/// Writer handles for the engine-owned metric series. One instance is built
/// per run and cloned into every virtual user; all writes go straight to the
/// shared stream with no per-user buffering.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    registry: Arc<Registry>,
    http_reqs: MetricHandle,
    http_req_duration: MetricHandle,
    http_req_failed: MetricHandle,
    checks: MetricHandle,
    iterations: MetricHandle,
    iteration_duration: MetricHandle,
    pub(crate) vus: MetricHandle,
    pub(crate) vus_max: MetricHandle,
    vu_faults: MetricHandle,
}

impl EngineMetrics {
    pub fn register(registry: Arc<Registry>) -> stampede_metrics::Result<Self> {
        Ok(Self {
            http_reqs: registry.register(HTTP_REQS, MetricKind::Counter)?,
            http_req_duration: registry.register(HTTP_REQ_DURATION, MetricKind::Trend)?,
            http_req_failed: registry.register(HTTP_REQ_FAILED, MetricKind::Rate)?,
            checks: registry.register(CHECKS, MetricKind::Rate)?,
            iterations: registry.register(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: registry.register(ITERATION_DURATION, MetricKind::Trend)?,
            vus: registry.register(VUS, MetricKind::Gauge)?,
            vus_max: registry.register(VUS_MAX, MetricKind::Gauge)?,
            vu_faults: registry.register(VU_FAULTS, MetricKind::Counter)?,
            registry,
        })
    }

    /// Fold one request outcome into the stream: request count, failure rate,
    /// base and per-endpoint timing, and every check result.
    pub fn record_outcome(&self, outcome: &RequestOutcome) {
        let micros = duration_micros(outcome.duration);

        self.http_reqs.increment(1);
        self.http_req_failed.add_rate(!outcome.ok());
        self.http_req_duration.observe(micros);
        if let Some(tagged) = self
            .registry
            .endpoint_handle(HTTP_REQ_DURATION, outcome.endpoint)
        {
            tagged.observe(micros);
        }
        for check in &outcome.checks {
            self.checks.add_rate(check.passed);
        }
    }

    pub fn record_iteration(&self, duration: Duration) {
        self.iterations.increment(1);
        self.iteration_duration.observe(duration_micros(duration));
    }

    pub fn record_fault(&self) {
        self.vu_faults.increment(1);
    }
}

fn duration_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckOutcome;
    use stampede_http::TransportErrorKind;
    use stampede_metrics::MetricValue;

    fn metrics() -> (Arc<Registry>, EngineMetrics) {
        let registry = Arc::new(Registry::default());
        let engine = match EngineMetrics::register(registry.clone()) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        (registry, engine)
    }

    fn outcome(
        endpoint: &'static str,
        status: u16,
        error: Option<TransportErrorKind>,
        checks: Vec<CheckOutcome>,
    ) -> RequestOutcome {
        RequestOutcome {
            endpoint,
            status,
            error,
            duration: Duration::from_millis(5),
            checks,
        }
    }

    #[test]
    fn outcome_feeds_request_failure_and_check_series() {
        let (registry, engine) = metrics();

        engine.record_outcome(&outcome(
            "login",
            200,
            None,
            vec![CheckOutcome {
                name: "status is 200",
                passed: true,
            }],
        ));
        engine.record_outcome(&outcome(
            "profile",
            500,
            None,
            vec![CheckOutcome {
                name: "status is 200",
                passed: false,
            }],
        ));
        engine.record_outcome(&outcome(
            "profile",
            0,
            Some(TransportErrorKind::Timeout),
            Vec::new(),
        ));

        let snapshot = registry.snapshot();
        let get = |name: &str, endpoint: Option<&str>| {
            snapshot
                .iter()
                .find(|s| s.name == name && s.endpoint.as_deref() == endpoint)
                .map(|s| s.values.clone())
        };

        assert!(matches!(get(HTTP_REQS, None), Some(MetricValue::Counter(3))));
        match get(HTTP_REQ_FAILED, None) {
            Some(MetricValue::Rate { total, hits, .. }) => {
                assert_eq!(total, 3);
                assert_eq!(hits, 2);
            }
            other => panic!("unexpected http_req_failed: {other:?}"),
        }
        match get(CHECKS, None) {
            Some(MetricValue::Rate { total, hits, .. }) => {
                assert_eq!(total, 2);
                assert_eq!(hits, 1);
            }
            other => panic!("unexpected checks: {other:?}"),
        }
        match get(HTTP_REQ_DURATION, Some("profile")) {
            Some(MetricValue::Trend(t)) => assert_eq!(t.count, 2),
            other => panic!("unexpected profile sub-series: {other:?}"),
        }
        match get(HTTP_REQ_DURATION, None) {
            Some(MetricValue::Trend(t)) => assert_eq!(t.count, 3),
            other => panic!("unexpected base duration: {other:?}"),
        }
    }

    #[test]
    fn iteration_and_fault_counters() {
        let (registry, engine) = metrics();
        engine.record_iteration(Duration::from_millis(10));
        engine.record_iteration(Duration::from_millis(20));
        engine.record_fault();

        let snapshot = registry.snapshot();
        let counter = |name: &str| {
            snapshot
                .iter()
                .find(|s| s.name == name)
                .map(|s| s.values.clone())
        };
        assert!(matches!(
            counter(ITERATIONS),
            Some(MetricValue::Counter(2))
        ));
        assert!(matches!(counter(VU_FAULTS), Some(MetricValue::Counter(1))));
    }
}
