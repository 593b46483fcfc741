use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Rate {
        total: u64,
        hits: u64,
        /// hits/total; 0.0 when no observations were recorded.
        rate: f64,
    },
    Trend(TrendSummary),
}

#[derive(Debug, Clone)]
pub struct TrendSummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

/// A success/total pair. `rate()` is defined as 0.0 at zero observations so
/// thresholds on untouched metrics compare against a concrete value.
#[derive(Debug, Default)]
pub struct RatePair {
    pub total: AtomicU64,
    pub hits: AtomicU64,
}

impl RatePair {
    pub fn add(&self, hit: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Release);
        }
    }

    /// One consistent (total, hits) reading. Hits are loaded first and the
    /// release on the hit increment makes its total increment visible, so a
    /// concurrent `add(true)` can never surface hits > total.
    #[must_use]
    pub fn load(&self) -> (u64, u64) {
        let hits = self.hits.load(Ordering::Acquire);
        let total = self.total.load(Ordering::Relaxed);
        (total, hits)
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        let (total, hits) = self.load();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    // Defaults compatible with typical latency in microseconds.
    // Upper bound: 1 hour in microseconds.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub(crate) fn summarize_trend(h: &Histogram<u64>) -> TrendSummary {
    let count = h.len();
    let at = |q| (count > 0).then(|| h.value_at_quantile(q) as f64);

    TrendSummary {
        p50: at(0.50),
        p75: at(0.75),
        p90: at(0.90),
        p95: at(0.95),
        p99: at(0.99),
        min: (count > 0).then(|| h.min() as f64),
        max: (count > 0).then(|| h.max() as f64),
        mean: (count > 0).then(|| h.mean()),
        stdev: (count > 0).then(|| h.stdev()),
        count,
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<RatePair>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricStorage::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => MetricStorage::Gauge(Arc::new(AtomicI64::new(0))),
            MetricKind::Rate => MetricStorage::Rate(Arc::new(RatePair::default())),
            MetricKind::Trend => {
                MetricStorage::Trend(Arc::new(Mutex::new(new_default_histogram())))
            }
        }
    }

    pub(crate) fn kind(&self) -> MetricKind {
        match self {
            MetricStorage::Counter(_) => MetricKind::Counter,
            MetricStorage::Gauge(_) => MetricKind::Gauge,
            MetricStorage::Rate(_) => MetricKind::Rate,
            MetricStorage::Trend(_) => MetricKind::Trend,
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            MetricStorage::Counter(a) => MetricHandle::Counter(a.clone()),
            MetricStorage::Gauge(a) => MetricHandle::Gauge(a.clone()),
            MetricStorage::Rate(a) => MetricHandle::Rate(a.clone()),
            MetricStorage::Trend(a) => MetricHandle::Trend(a.clone()),
        }
    }

    pub(crate) fn value(&self) -> MetricValue {
        match self {
            MetricStorage::Counter(a) => MetricValue::Counter(a.load(Ordering::Relaxed)),
            MetricStorage::Gauge(a) => MetricValue::Gauge(a.load(Ordering::Relaxed)),
            MetricStorage::Rate(r) => {
                let (total, hits) = r.load();
                MetricValue::Rate {
                    total,
                    hits,
                    rate: if total == 0 {
                        0.0
                    } else {
                        hits as f64 / total as f64
                    },
                }
            }
            MetricStorage::Trend(h) => MetricValue::Trend(summarize_trend(&h.lock())),
        }
    }
}

/// Cheap cloneable writer handle for one metric series.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<RatePair>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl MetricHandle {
    #[inline]
    pub fn increment(&self, value: u64) {
        if let MetricHandle::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.store(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn increment_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn decrement_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.fetch_sub(value, Ordering::Relaxed);
        }
    }

    /// Raise a gauge to `value` if it is below it, keeping the historical peak.
    pub fn raise_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            let mut cur = g.load(Ordering::Relaxed);
            while value > cur {
                match g.compare_exchange_weak(cur, value, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(observed) => cur = observed,
                }
            }
        }
    }

    #[inline]
    pub fn add_rate(&self, hit: bool) {
        if let MetricHandle::Rate(r) = self {
            r.add(hit);
        }
    }

    #[inline]
    pub fn observe(&self, value: u64) {
        if let MetricHandle::Trend(h) = self {
            let _ = h.lock().record(value.max(1));
        }
    }

    pub fn counter_value(&self) -> u64 {
        if let MetricHandle::Counter(c) = self {
            c.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn gauge_value(&self) -> i64 {
        if let MetricHandle::Gauge(g) = self {
            g.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn rate_value(&self) -> f64 {
        if let MetricHandle::Rate(r) = self {
            r.rate()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_trend_empty_has_no_stats() {
        let h = new_default_histogram();
        let s = summarize_trend(&h);
        assert_eq!(s.count, 0);
        assert!(s.p50.is_none());
        assert!(s.p95.is_none());
        assert!(s.min.is_none());
        assert!(s.max.is_none());
        assert!(s.mean.is_none());
        assert!(s.stdev.is_none());
    }

    #[test]
    fn summarize_trend_non_empty_has_stats() {
        let mut h = new_default_histogram();
        let _ = h.record(10);
        let _ = h.record(20);
        let _ = h.record(30);

        let s = summarize_trend(&h);
        assert_eq!(s.count, 3);
        assert_eq!(s.min, Some(10.0));
        assert_eq!(s.max, Some(30.0));
        assert!(s.p50.is_some());
        assert!(s.p95.is_some());
    }

    #[test]
    fn trend_percentiles_are_insertion_order_independent() {
        let values: Vec<u64> = (1..=500).map(|i| i * 3 % 997 + 1).collect();

        let mut forward = new_default_histogram();
        for v in &values {
            let _ = forward.record(*v);
        }

        let mut reversed = new_default_histogram();
        for v in values.iter().rev() {
            let _ = reversed.record(*v);
        }

        let a = summarize_trend(&forward);
        let b = summarize_trend(&reversed);
        assert_eq!(a.p50, b.p50);
        assert_eq!(a.p95, b.p95);
        assert_eq!(a.p99, b.p99);
        assert_eq!(a.min, b.min);
        assert_eq!(a.max, b.max);
    }

    #[test]
    fn rate_is_zero_without_observations_and_one_after_all_hits() {
        let r = RatePair::default();
        assert_eq!(r.rate(), 0.0);

        r.add(true);
        r.add(true);
        assert_eq!(r.rate(), 1.0);

        r.add(false);
        r.add(false);
        assert_eq!(r.rate(), 0.5);
    }

    #[test]
    fn rate_reading_never_overcounts_hits() {
        let pair = Arc::new(RatePair::default());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let pair = pair.clone();
                std::thread::spawn(move || {
                    for _ in 0..20_000 {
                        pair.add(true);
                    }
                })
            })
            .collect();

        for _ in 0..50_000 {
            let (total, hits) = pair.load();
            assert!(hits <= total, "observed hits {hits} > total {total}");
            assert!(pair.rate() <= 1.0);
        }

        for w in writers {
            if w.join().is_err() {
                panic!("writer thread panicked");
            }
        }
        assert_eq!(pair.load(), (80_000, 80_000));
        assert_eq!(pair.rate(), 1.0);
    }

    #[test]
    fn gauge_raise_keeps_peak() {
        let g = MetricHandle::Gauge(Arc::new(AtomicI64::new(0)));
        g.raise_gauge(5);
        g.raise_gauge(3);
        assert_eq!(g.gauge_value(), 5);
        g.raise_gauge(8);
        assert_eq!(g.gauge_value(), 8);
    }
}
