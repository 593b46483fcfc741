use std::sync::Arc;
use std::time::{Duration, Instant};

use stampede_http::{HttpClient, HttpRequest, HttpResponse, TransportErrorKind};
use stampede_metrics::Registry;

use crate::check::{Check, CheckOutcome};

/// What one instrumented request produced. Transport failures are folded in
/// rather than propagated: a failed request is a data point, not an error.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// Logical endpoint label, used as the sub-series tag on timing metrics.
    pub endpoint: &'static str,
    /// HTTP status, or 0 when the request never produced a response.
    pub status: u16,
    pub error: Option<TransportErrorKind>,
    pub duration: Duration,
    pub checks: Vec<CheckOutcome>,
}

impl RequestOutcome {
    /// Protocol-level success: a response arrived and was not a 4xx/5xx.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.error.is_none() && self.status < 400
    }

    #[must_use]
    pub fn checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// One executed request: the metric-facing outcome plus the response body
/// for scenarios that need to read it.
#[derive(Debug)]
pub struct Executed {
    pub outcome: RequestOutcome,
    pub response: Option<HttpResponse>,
}

/// Issues requests on the shared client and turns each into a
/// [`RequestOutcome`]. Cloned into every virtual user; the pool underneath
/// is shared.
#[derive(Debug, Clone)]
pub struct Executor {
    client: HttpClient,
    request_timeout: Duration,
}

impl Executor {
    #[must_use]
    pub fn new(client: HttpClient, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Send `req`, time it, and evaluate `checks` against the response.
    /// Checks are skipped (not failed) when no response arrived; the
    /// transport error already accounts for the request.
    pub async fn execute(
        &self,
        endpoint: &'static str,
        mut req: HttpRequest,
        checks: &[Check],
    ) -> Executed {
        if req.timeout.is_none() {
            req.timeout = Some(self.request_timeout);
        }

        let started = Instant::now();
        let result = self.client.send(req).await;
        let duration = started.elapsed();

        match result {
            Ok(response) => {
                let checks = checks.iter().map(|c| c.evaluate(&response)).collect();
                Executed {
                    outcome: RequestOutcome {
                        endpoint,
                        status: response.status,
                        error: None,
                        duration,
                        checks,
                    },
                    response: Some(response),
                }
            }
            Err(err) => Executed {
                outcome: RequestOutcome {
                    endpoint,
                    status: 0,
                    error: Some(err.transport_error_kind()),
                    duration,
                    checks: Vec::new(),
                },
                response: None,
            },
        }
    }
}

/// Everything a scenario iteration gets to work with.
#[derive(Debug, Clone)]
pub struct ScenarioEnv {
    pub executor: Executor,
    pub metrics: Arc<Registry>,
    /// Weight of the configured branch, straight from the workload config.
    pub branch_probability: f64,
}
