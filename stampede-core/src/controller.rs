use std::sync::Arc;
use std::time::Instant;

use stampede_http::HttpClient;
use stampede_metrics::Registry;

use crate::config::WorkloadConfig;
use crate::error::Result;
use crate::executor::{Executor, ScenarioEnv};
use crate::recorder::EngineMetrics;
use crate::report::RunReport;
use crate::scenario::Scenario;
use crate::scheduler::VuScheduler;
use crate::thresholds::{all_passed, evaluate};

/// Drive one full run: register metrics, validate, run setup once, hold the
/// fleet of virtual users through the configured shape, and evaluate
/// thresholds periodically and once more against the final snapshot.
pub async fn run<S: Scenario>(config: WorkloadConfig, scenario: S) -> Result<RunReport> {
    run_with_client(config, scenario, HttpClient::default()).await
}

/// Same as [`run`] with a caller-supplied client, mostly for tests that need
/// tighter connect timeouts.
pub async fn run_with_client<S: Scenario>(
    config: WorkloadConfig,
    scenario: S,
    client: HttpClient,
) -> Result<RunReport> {
    let registry = Arc::new(Registry::default());
    let engine = EngineMetrics::register(registry.clone())?;
    scenario.register_metrics(&registry)?;

    // Validation runs after registration so thresholds can reference both
    // engine and scenario metrics.
    config.validate(&registry)?;

    let env = ScenarioEnv {
        executor: Executor::new(client, config.request_timeout),
        metrics: registry.clone(),
        branch_probability: config.branch_probability,
    };

    let scenario_name = scenario.name();
    let setup = scenario.setup(&env, &config.credentials).await?;

    let (scheduler, mut supervisor) = VuScheduler::start(
        Arc::new(scenario),
        Arc::new(setup),
        env,
        engine,
        &config,
    );

    let started_at = Instant::now();
    let mut ticker = tokio::time::interval(config.threshold_eval_interval);
    // A stalled runtime should not cause a burst of catch-up evaluations.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.reset();

    let mut first_breach_at = None;
    let mut aborted = false;

    loop {
        tokio::select! {
            res = &mut supervisor => {
                res?;
                break;
            }
            _ = ticker.tick() => {
                let results = evaluate(&registry, &config.thresholds);
                if !all_passed(&results) {
                    if first_breach_at.is_none() {
                        first_breach_at = Some(started_at.elapsed());
                    }
                    if config.abort_on_threshold_fail && !aborted {
                        aborted = true;
                        scheduler.stop();
                    }
                }
            }
        }
    }

    let elapsed = started_at.elapsed();
    let thresholds = evaluate(&registry, &config.thresholds);
    if !all_passed(&thresholds) && first_breach_at.is_none() {
        first_breach_at = Some(elapsed);
    }

    Ok(RunReport {
        scenario: scenario_name,
        elapsed,
        metrics: registry.snapshot(),
        thresholds,
        first_breach_at,
        aborted,
    })
}
