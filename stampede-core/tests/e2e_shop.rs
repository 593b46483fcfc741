use std::time::Duration;

use stampede_core::shop::{ERRORS_METRIC, ShopScenario};
use stampede_core::{
    Error, RunReport, ThresholdSet, WorkloadConfig, recorder, run,
};
use stampede_metrics::MetricValue;
use stampede_testserver::TestServer;

fn fast_config(vus: u64, duration_ms: u64) -> WorkloadConfig {
    WorkloadConfig {
        vus,
        duration: Duration::from_millis(duration_ms),
        think_time: Duration::ZERO,
        ..WorkloadConfig::default()
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

fn counter(report: &RunReport, name: &str) -> u64 {
    match report.series(name).map(|s| &s.values) {
        Some(MetricValue::Counter(v)) => *v,
        other => panic!("expected counter for {name}, got {other:?}"),
    }
}

fn rate(report: &RunReport, name: &str) -> (u64, u64, f64) {
    match report.series(name).map(|s| &s.values) {
        Some(MetricValue::Rate { total, hits, rate }) => (*total, *hits, *rate),
        other => panic!("expected rate for {name}, got {other:?}"),
    }
}

#[tokio::test]
async fn healthy_run_passes_thresholds() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let config = WorkloadConfig {
        thresholds: default_thresholds(),
        branch_probability: 0.1,
        ..fast_config(4, 500)
    };
    let report = run(config, ShopScenario::new(server.base_url())).await?;

    let seen = server.stats().requests_total();
    server.shutdown().await;

    assert!(seen > 0, "expected server to see requests");
    assert!(report.passed(), "thresholds: {:?}", report.thresholds);
    assert!(report.first_breach_at.is_none());
    assert!(!report.aborted);

    // No checks failed, so the scenario error rate never observed anything.
    let (total, hits, observed) = rate(&report, ERRORS_METRIC);
    assert_eq!((total, hits), (0, 0));
    assert_eq!(observed, 0.0);

    // Every iteration makes exactly three requests.
    assert_eq!(counter(&report, recorder::HTTP_REQS), {
        let iterations = counter(&report, recorder::ITERATIONS);
        iterations * 3
    });

    match report.series(recorder::VUS_MAX).map(|s| &s.values) {
        Some(MetricValue::Gauge(peak)) => assert_eq!(*peak, 4),
        other => panic!("expected vus_max gauge, got {other:?}"),
    }
    match report.series(recorder::VUS).map(|s| &s.values) {
        Some(MetricValue::Gauge(live)) => assert_eq!(*live, 0),
        other => panic!("expected vus gauge, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn branch_probability_zero_never_checks_out() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let config = WorkloadConfig {
        branch_probability: 0.0,
        ..fast_config(2, 300)
    };
    let report = run(config, ShopScenario::new(server.base_url())).await?;

    let checkout = server.stats().checkout_hits();
    let health = server.stats().health_hits();
    server.shutdown().await;

    assert_eq!(checkout, 0);
    assert_eq!(health, counter(&report, recorder::ITERATIONS));
    Ok(())
}

#[tokio::test]
async fn branch_probability_one_always_checks_out() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let config = WorkloadConfig {
        branch_probability: 1.0,
        ..fast_config(2, 300)
    };
    let report = run(config, ShopScenario::new(server.base_url())).await?;

    let checkout = server.stats().checkout_hits();
    let health = server.stats().health_hits();
    server.shutdown().await;

    assert_eq!(health, 0);
    assert_eq!(checkout, counter(&report, recorder::ITERATIONS));
    Ok(())
}

#[tokio::test]
async fn single_iteration_records_exact_observation_counts() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    // Long think time against a short duration pins each user to one pass.
    let config = WorkloadConfig {
        vus: 1,
        duration: Duration::from_millis(300),
        think_time: Duration::from_secs(30),
        ..WorkloadConfig::default()
    };
    let report = run(config, ShopScenario::new(server.base_url())).await?;
    server.shutdown().await;

    assert_eq!(counter(&report, recorder::ITERATIONS), 1);
    assert_eq!(counter(&report, recorder::HTTP_REQS), 3);

    let (total, hits, _) = rate(&report, recorder::CHECKS);
    assert_eq!((total, hits), (3, 3));

    let (total, hits, observed) = rate(&report, recorder::HTTP_REQ_FAILED);
    assert_eq!((total, hits), (3, 0));
    assert_eq!(observed, 0.0);

    // Base series plus one sub-series per touched endpoint.
    match report.series(recorder::HTTP_REQ_DURATION).map(|s| &s.values) {
        Some(MetricValue::Trend(t)) => assert_eq!(t.count, 3),
        other => panic!("expected base duration trend, got {other:?}"),
    }
    for endpoint in ["profile", "cart", "health"] {
        let found = report.metrics.iter().any(|s| {
            s.name == recorder::HTTP_REQ_DURATION && s.endpoint.as_deref() == Some(endpoint)
        });
        assert!(found, "missing duration sub-series for {endpoint}");
    }

    Ok(())
}

#[tokio::test]
async fn broken_profile_drives_error_rate_to_one() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    server.stats().set_fail_profile(true);

    let config = WorkloadConfig {
        thresholds: default_thresholds(),
        ..fast_config(2, 300)
    };
    let report = run(config, ShopScenario::new(server.base_url())).await?;
    server.shutdown().await;

    // Only failing passes feed the error metric, so a run where every pass
    // fails reads 1.0.
    let (total, _, observed) = rate(&report, ERRORS_METRIC);
    assert!(total > 0);
    assert_eq!(observed, 1.0);

    assert!(!report.passed());
    let errors_verdict = report
        .thresholds
        .iter()
        .find(|t| t.metric == ERRORS_METRIC)
        .map(|t| t.passed);
    assert_eq!(errors_verdict, Some(false));
    assert!(report.first_breach_at.is_some());

    // One request in three hits the broken endpoint.
    let (total, hits, _) = rate(&report, recorder::HTTP_REQ_FAILED);
    assert_eq!(hits * 3, total);

    Ok(())
}

#[tokio::test]
async fn abort_on_breach_cuts_the_run_short() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    server.stats().set_fail_profile(true);

    let config = WorkloadConfig {
        vus: 2,
        duration: Duration::from_secs(30),
        think_time: Duration::from_millis(10),
        thresholds: default_thresholds(),
        abort_on_threshold_fail: true,
        threshold_eval_interval: Duration::from_millis(100),
        ..WorkloadConfig::default()
    };
    let report = run(config, ShopScenario::new(server.base_url())).await?;
    server.shutdown().await;

    assert!(report.aborted);
    assert!(!report.passed());
    assert!(report.first_breach_at.is_some());
    assert!(
        report.elapsed < Duration::from_secs(5),
        "expected an early stop, ran for {:?}",
        report.elapsed
    );

    Ok(())
}

#[tokio::test]
async fn failing_setup_spawns_no_users() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    server.stats().set_fail_login(true);

    let result = run(fast_config(4, 300), ShopScenario::new(server.base_url())).await;

    let login = server.stats().login_hits();
    let profile = server.stats().profile_hits();
    let total = server.stats().requests_total();
    server.shutdown().await;

    assert!(matches!(result, Err(Error::Setup(_))));
    assert_eq!(login, 1);
    assert_eq!(profile, 0);
    assert_eq!(total, 1, "nothing beyond the failed login should run");

    Ok(())
}

#[tokio::test]
async fn threshold_on_unknown_metric_is_a_config_error() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let config = WorkloadConfig {
        thresholds: vec![ThresholdSet {
            metric: "no_such_metric".to_string(),
            expressions: vec!["rate<0.01".to_string()],
        }],
        ..fast_config(1, 100)
    };
    let result = run(config, ShopScenario::new(server.base_url())).await;

    let total = server.stats().requests_total();
    server.shutdown().await;

    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(total, 0, "validation failure must precede setup");

    Ok(())
}

#[tokio::test]
async fn checkout_mix_tracks_probability() -> anyhow::Result<()> {
    let server = TestServer::start().await?;

    let config = WorkloadConfig {
        branch_probability: 0.3,
        ..fast_config(4, 800)
    };
    let report = run(config, ShopScenario::new(server.base_url())).await?;

    let checkout = server.stats().checkout_hits();
    let health = server.stats().health_hits();
    server.shutdown().await;

    let iterations = counter(&report, recorder::ITERATIONS);
    assert_eq!(checkout + health, iterations);
    assert!(checkout > 0, "a 0.3 mix should check out at least once");
    assert!(health > 0, "a 0.3 mix should hit health at least once");
    // Loose bound; the draw count is modest.
    if iterations >= 100 {
        let share = checkout as f64 / iterations as f64;
        assert!(
            (0.1..=0.5).contains(&share),
            "checkout share {share} far from 0.3 over {iterations} draws"
        );
    }

    Ok(())
}
