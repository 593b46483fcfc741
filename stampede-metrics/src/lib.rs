pub mod metrics;
pub mod registry;

pub use metrics::{MetricHandle, MetricKind, MetricValue, RatePair, TrendSummary};
pub use registry::{Error, MetricSeriesSummary, Registry, Result};
