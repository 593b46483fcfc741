use stampede_core::shop::{ERRORS_METRIC, ShopScenario};
use stampede_core::{Error, ThresholdSet, WorkloadConfig, recorder};
use stampede_metrics::MetricValue;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;

pub async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let out = output::formatter(args.output);
    out.print_header(&args.target);

    let config = workload_config(&args);
    let scenario = ShopScenario::new(&args.target);

    let report = match stampede_core::run(config, scenario).await {
        Ok(report) => report,
        Err(err @ Error::Config(_)) => {
            eprintln!("{err}");
            return Ok(ExitCode::InvalidInput);
        }
        Err(err @ Error::Setup(_)) => {
            eprintln!("{err}");
            return Ok(ExitCode::SetupFailed);
        }
        Err(err) => {
            eprintln!("{err}");
            return Ok(ExitCode::RuntimeError);
        }
    };

    out.print_report(&report)?;

    let checks_failed = match report.series(recorder::CHECKS).map(|s| &s.values) {
        Some(MetricValue::Rate { total, hits, .. }) => hits < total,
        _ => false,
    };
    let thresholds_failed = report.aborted || report.thresholds.iter().any(|t| !t.passed);

    Ok(ExitCode::from_quality_gates(checks_failed, thresholds_failed))
}

fn workload_config(args: &RunArgs) -> WorkloadConfig {
    let thresholds = if args.thresholds.is_empty() {
        default_thresholds()
    } else {
        args.thresholds.clone()
    };

    WorkloadConfig {
        vus: args.vus,
        duration: args.duration,
        stages: args.stages.clone(),
        thresholds,
        branch_probability: args.checkout_rate,
        think_time: args.think_time,
        request_timeout: args.request_timeout,
        abort_on_threshold_fail: args.abort_on_threshold_fail,
        threshold_eval_interval: args.eval_interval,
        credentials: vec![
            ("email".to_string(), args.email.clone()),
            ("password".to_string(), args.password.clone()),
        ],
    }
}

fn default_thresholds() -> Vec<ThresholdSet> {
    vec![
        ThresholdSet {
            metric: ERRORS_METRIC.to_string(),
            expressions: vec!["rate<0.01".to_string()],
        },
        ThresholdSet {
            metric: recorder::HTTP_REQ_DURATION.to_string(),
            expressions: vec!["p(95)<1000".to_string()],
        },
    ]
}
