use stampede_metrics::{MetricValue, Registry};

/// Pass/fail criteria for one metric, as written in configuration.
#[derive(Debug, Clone)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// Rate metrics: hits/total.
    Rate,
    /// Counters and rate totals.
    Count,
    /// Gauges: current value.
    Value,
    Avg,
    Min,
    Max,
    /// Percentile in [0, 100].
    Percentile(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Op {
    fn holds(self, observed: f64, expected: f64) -> bool {
        match self {
            Op::Lt => observed < expected,
            Op::Le => observed <= expected,
            Op::Gt => observed > expected,
            Op::Ge => observed >= expected,
            Op::Eq => (observed - expected).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: Aggregation,
    pub op: Op,
    pub value: f64,
}

/// Parse one expression of the form `agg op value`, for example
/// `rate<0.01` or `p(95)<1000`. Durations are expressed in milliseconds.
pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let raw = raw.trim();

    let (op, op_len, op_pos) = ["<=", ">=", "==", "<", ">"]
        .iter()
        .filter_map(|candidate| raw.find(candidate).map(|pos| (*candidate, pos)))
        .min_by_key(|(candidate, pos)| (*pos, candidate.len() == 1))
        .map(|(candidate, pos)| {
            let op = match candidate {
                "<=" => Op::Le,
                ">=" => Op::Ge,
                "==" => Op::Eq,
                "<" => Op::Lt,
                _ => Op::Gt,
            };
            (op, candidate.len(), pos)
        })
        .ok_or_else(|| format!("no comparison operator in `{raw}`"))?;

    let agg = parse_aggregation(raw[..op_pos].trim())?;
    let value_str = raw[op_pos + op_len..].trim();
    let value: f64 = value_str
        .parse()
        .map_err(|_| format!("invalid numeric bound `{value_str}`"))?;

    Ok(ThresholdExpr { agg, op, value })
}

fn parse_aggregation(raw: &str) -> Result<Aggregation, String> {
    match raw {
        "rate" => Ok(Aggregation::Rate),
        "count" => Ok(Aggregation::Count),
        "value" => Ok(Aggregation::Value),
        "avg" => Ok(Aggregation::Avg),
        "min" => Ok(Aggregation::Min),
        "max" => Ok(Aggregation::Max),
        _ => {
            let inner = raw
                .strip_prefix("p(")
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{raw}`"))?;
            let q: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}`"))?;
            if !(0.0..=100.0).contains(&q) {
                return Err(format!("percentile {q} out of [0, 100]"));
            }
            Ok(Aggregation::Percentile(q))
        }
    }
}

/// The verdict for one expression against one metric. Every configured
/// expression produces a result, passing or not, so reports can show the
/// observed value next to the bound.
#[derive(Debug, Clone)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    /// Observed aggregate, `None` when the aggregation does not apply to the
    /// metric's kind. An inapplicable aggregation fails the threshold.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Evaluate every configured threshold against the base series of its metric.
/// Endpoint sub-series are reporting detail and are not thresholded.
#[must_use]
pub fn evaluate(registry: &Registry, sets: &[ThresholdSet]) -> Vec<ThresholdResult> {
    let snapshot = registry.snapshot();
    let mut out = Vec::new();

    for set in sets {
        let value = snapshot
            .iter()
            .find(|s| s.name == set.metric && s.endpoint.is_none())
            .map(|s| s.values.clone());

        for raw in &set.expressions {
            let result = match (parse_threshold_expr(raw), &value) {
                (Ok(expr), Some(value)) => {
                    let observed = aggregate(value, expr.agg);
                    ThresholdResult {
                        metric: set.metric.clone(),
                        expression: raw.clone(),
                        observed,
                        passed: observed.is_some_and(|o| expr.op.holds(o, expr.value)),
                    }
                }
                // Unparseable expressions and missing metrics are rejected
                // up front by config validation; fail closed if one slips
                // through anyway.
                _ => ThresholdResult {
                    metric: set.metric.clone(),
                    expression: raw.clone(),
                    observed: None,
                    passed: false,
                },
            };
            out.push(result);
        }
    }

    out
}

#[must_use]
pub fn all_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}

/// Trend observations are stored in microseconds; thresholds speak
/// milliseconds, so trend aggregates are scaled before comparison.
fn aggregate(value: &MetricValue, agg: Aggregation) -> Option<f64> {
    const MICROS_PER_MILLI: f64 = 1000.0;

    match (value, agg) {
        (MetricValue::Counter(v), Aggregation::Count) => Some(*v as f64),
        (MetricValue::Gauge(v), Aggregation::Value) => Some(*v as f64),
        (MetricValue::Rate { rate, .. }, Aggregation::Rate) => Some(*rate),
        (MetricValue::Rate { total, .. }, Aggregation::Count) => Some(*total as f64),
        (MetricValue::Trend(t), Aggregation::Avg) => t.mean.map(|v| v / MICROS_PER_MILLI),
        (MetricValue::Trend(t), Aggregation::Min) => t.min.map(|v| v / MICROS_PER_MILLI),
        (MetricValue::Trend(t), Aggregation::Max) => t.max.map(|v| v / MICROS_PER_MILLI),
        (MetricValue::Trend(t), Aggregation::Percentile(q)) => {
            let v = match q {
                q if (q - 50.0).abs() < f64::EPSILON => t.p50,
                q if (q - 75.0).abs() < f64::EPSILON => t.p75,
                q if (q - 90.0).abs() < f64::EPSILON => t.p90,
                q if (q - 95.0).abs() < f64::EPSILON => t.p95,
                q if (q - 99.0).abs() < f64::EPSILON => t.p99,
                _ => return None,
            };
            // An empty trend has no percentiles; nothing observed means
            // nothing violated the bound.
            match v {
                Some(v) => Some(v / MICROS_PER_MILLI),
                None => Some(0.0),
            }
        }
        _ => None,
    }
}
