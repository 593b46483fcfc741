use serde::Serialize;
use std::io::Write as _;

use stampede_core::RunReport;
use stampede_metrics::{MetricValue, TrendSummary};

use crate::cli::OutputFormat;

pub(crate) trait OutputFormatter {
    fn print_header(&self, target: &str);
    fn print_report(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(HumanReadableOutput),
        OutputFormat::Json => Box::new(JsonOutput),
    }
}

struct HumanReadableOutput;

fn ms(micros: f64) -> f64 {
    micros / 1000.0
}

fn render_trend(t: &TrendSummary) -> String {
    if t.count == 0 {
        return "count=0".to_string();
    }
    let v = |o: Option<f64>| o.map_or(0.0, ms);
    format!(
        "avg={:.2}ms min={:.2}ms p50={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms count={}",
        v(t.mean),
        v(t.min),
        v(t.p50),
        v(t.p95),
        v(t.p99),
        v(t.max),
        t.count
    )
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, target: &str) {
        println!("target: {target}");
        println!();
    }

    fn print_report(&self, report: &RunReport) -> anyhow::Result<()> {
        println!(
            "scenario: {} ({:.1}s)",
            report.scenario,
            report.elapsed.as_secs_f64()
        );
        println!();

        for series in &report.metrics {
            let label = match &series.endpoint {
                Some(endpoint) => format!("{}{{endpoint={endpoint}}}", series.name),
                None => series.name.clone(),
            };
            let rendered = match &series.values {
                MetricValue::Counter(v) => format!("{v}"),
                MetricValue::Gauge(v) => format!("{v}"),
                MetricValue::Rate { total, hits, rate } => {
                    format!("{:.2}% ({hits}/{total})", rate * 100.0)
                }
                MetricValue::Trend(t) => render_trend(t),
            };
            println!("  {label:.<40} {rendered}");
        }

        if !report.thresholds.is_empty() {
            println!();
            for t in &report.thresholds {
                let mark = if t.passed { "PASS" } else { "FAIL" };
                let observed = t
                    .observed
                    .map_or_else(|| "n/a".to_string(), |o| format!("{o:.4}"));
                println!(
                    "  {mark} {}: {} (observed {observed})",
                    t.metric, t.expression
                );
            }
        }

        println!();
        if let Some(at) = report.first_breach_at {
            println!("first threshold breach at {:.1}s", at.as_secs_f64());
        }
        if report.aborted {
            println!("run aborted on threshold breach");
        }
        println!("verdict: {}", if report.passed() { "PASS" } else { "FAIL" });
        Ok(())
    }
}

struct JsonOutput;

#[derive(Debug, Serialize)]
struct JsonSeries<'a> {
    name: &'a str,
    endpoint: Option<&'a str>,
    kind: String,
    #[serde(flatten)]
    value: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum JsonValue {
    Scalar { value: i64 },
    Rate { total: u64, hits: u64, rate: f64 },
    Trend { trend: JsonTrend },
}

/// Trend stats with durations converted to milliseconds.
#[derive(Debug, Serialize)]
struct JsonTrend {
    count: u64,
    avg_ms: Option<f64>,
    min_ms: Option<f64>,
    max_ms: Option<f64>,
    p50_ms: Option<f64>,
    p75_ms: Option<f64>,
    p90_ms: Option<f64>,
    p95_ms: Option<f64>,
    p99_ms: Option<f64>,
}

impl From<&TrendSummary> for JsonTrend {
    fn from(t: &TrendSummary) -> Self {
        Self {
            count: t.count,
            avg_ms: t.mean.map(ms),
            min_ms: t.min.map(ms),
            max_ms: t.max.map(ms),
            p50_ms: t.p50.map(ms),
            p75_ms: t.p75.map(ms),
            p90_ms: t.p90.map(ms),
            p95_ms: t.p95.map(ms),
            p99_ms: t.p99.map(ms),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonThreshold<'a> {
    metric: &'a str,
    expression: &'a str,
    observed: Option<f64>,
    passed: bool,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    scenario: &'a str,
    elapsed_secs: f64,
    passed: bool,
    aborted: bool,
    first_breach_at_secs: Option<f64>,
    metrics: Vec<JsonSeries<'a>>,
    thresholds: Vec<JsonThreshold<'a>>,
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _target: &str) {}

    fn print_report(&self, report: &RunReport) -> anyhow::Result<()> {
        let metrics = report
            .metrics
            .iter()
            .map(|s| JsonSeries {
                name: &s.name,
                endpoint: s.endpoint.as_deref(),
                kind: s.kind.to_string(),
                value: match &s.values {
                    MetricValue::Counter(v) => JsonValue::Scalar {
                        value: i64::try_from(*v).unwrap_or(i64::MAX),
                    },
                    MetricValue::Gauge(v) => JsonValue::Scalar { value: *v },
                    MetricValue::Rate { total, hits, rate } => JsonValue::Rate {
                        total: *total,
                        hits: *hits,
                        rate: *rate,
                    },
                    MetricValue::Trend(t) => JsonValue::Trend { trend: t.into() },
                },
            })
            .collect();

        let thresholds = report
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                metric: &t.metric,
                expression: &t.expression,
                observed: t.observed,
                passed: t.passed,
            })
            .collect();

        let doc = JsonReport {
            scenario: report.scenario,
            elapsed_secs: report.elapsed.as_secs_f64(),
            passed: report.passed(),
            aborted: report.aborted,
            first_breach_at_secs: report.first_breach_at.map(|d| d.as_secs_f64()),
            metrics,
            thresholds,
        };

        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &doc)?;
        writeln!(stdout)?;
        Ok(())
    }
}
