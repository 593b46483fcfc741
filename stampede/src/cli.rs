use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use stampede_core::{Stage, ThresholdSet};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    let unit = unit_str.trim();
    match unit {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

/// `DURATION:TARGET`, e.g. `30s:50`.
fn parse_stage(input: &str) -> Result<Stage, String> {
    let (duration_str, target_str) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid stage '{input}' (expected DURATION:TARGET, e.g. 30s:50)"))?;
    let duration = parse_duration(duration_str)?;
    let target: u64 = target_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid stage target '{target_str}'"))?;
    Ok(Stage { duration, target })
}

/// `METRIC:EXPR[,EXPR...]`, e.g. `http_req_duration:p(95)<1000`.
fn parse_threshold(input: &str) -> Result<ThresholdSet, String> {
    let (metric, exprs) = input.split_once(':').ok_or_else(|| {
        format!("invalid threshold '{input}' (expected METRIC:EXPR, e.g. errors:rate<0.01)")
    })?;
    let metric = metric.trim();
    if metric.is_empty() {
        return Err(format!("invalid threshold '{input}': empty metric name"));
    }
    let expressions: Vec<String> = exprs
        .split(',')
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    if expressions.is_empty() {
        return Err(format!("invalid threshold '{input}': no expressions"));
    }
    Ok(ThresholdSet {
        metric: metric.to_string(),
        expressions,
    })
}

fn parse_probability(input: &str) -> Result<f64, String> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid probability '{input}'"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("probability '{input}' must be within [0, 1]"));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// One JSON document on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Virtual-user HTTP load generator",
    after_help = "Examples:\n  stampede run http://localhost:8080 --vus 50 --duration 1m\n  stampede run http://localhost:8080 --stage 30s:50 --stage 30s:0\n  stampede run http://localhost:8080 --threshold 'errors:rate<0.01' --threshold 'http_req_duration:p(95)<1000'"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the storefront workload against a target
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Base URL of the target, e.g. http://localhost:8080
    pub target: String,

    /// Number of virtual users (flat shape; ignored when --stage is given)
    #[arg(long, default_value_t = 50)]
    pub vus: u64,

    /// Test duration for the flat shape (e.g. 10s, 1m)
    #[arg(long, value_parser = parse_duration, default_value = "1m")]
    pub duration: Duration,

    /// Ramp stage DURATION:TARGET (repeatable; replaces --vus/--duration)
    #[arg(long = "stage", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Threshold METRIC:EXPR[,EXPR...] (repeatable)
    #[arg(long = "threshold", value_parser = parse_threshold)]
    pub thresholds: Vec<ThresholdSet>,

    /// Probability of taking the checkout branch per iteration
    #[arg(long = "checkout-rate", value_parser = parse_probability, default_value = "0.1")]
    pub checkout_rate: f64,

    /// Pause between a user's iterations
    #[arg(long = "think-time", value_parser = parse_duration, default_value = "1s")]
    pub think_time: Duration,

    /// Per-request timeout
    #[arg(long = "request-timeout", value_parser = parse_duration, default_value = "30s")]
    pub request_timeout: Duration,

    /// Stop the run as soon as a threshold evaluation fails
    #[arg(long)]
    pub abort_on_threshold_fail: bool,

    /// How often thresholds are evaluated while the run is live
    #[arg(long = "eval-interval", value_parser = parse_duration, default_value = "5s")]
    pub eval_interval: Duration,

    /// Login email used during setup
    #[arg(long, env = "TEST_EMAIL", default_value = "perfuser@example.com")]
    pub email: String,

    /// Login password used during setup
    #[arg(long, env = "TEST_PASSWORD", default_value = "12345678")]
    pub password: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}
