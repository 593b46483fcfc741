use dashmap::DashMap;
use std::sync::Arc;

use crate::metrics::{MetricHandle, MetricKind, MetricStorage, MetricValue};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metric `{metric}` already registered as {existing}, requested {requested}")]
    KindMismatch {
        metric: String,
        existing: MetricKind,
        requested: MetricKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    name: Arc<str>,
    /// `None` is the base series; thresholds evaluate against it.
    endpoint: Option<Arc<str>>,
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub endpoint: Option<String>,
    pub kind: MetricKind,
    pub values: MetricValue,
}

/// Name-keyed metric stream. Registration is idempotent; all writer handles
/// update shared atomics so concurrent updates commute.
#[derive(Debug, Default)]
pub struct Registry {
    kinds: DashMap<Arc<str>, MetricKind>,
    series: DashMap<SeriesKey, MetricStorage>,
}

impl Registry {
    /// Register a metric and return the writer handle for its base series.
    /// Registering the same name with the same kind returns the existing series.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricHandle> {
        let name: Arc<str> = Arc::from(name);

        if let Some(existing) = self.kinds.get(&name) {
            if *existing != kind {
                return Err(Error::KindMismatch {
                    metric: name.to_string(),
                    existing: *existing,
                    requested: kind,
                });
            }
        } else {
            self.kinds.insert(name.clone(), kind);
        }

        let key = SeriesKey {
            name,
            endpoint: None,
        };
        let storage = self
            .series
            .entry(key)
            .or_insert_with(|| MetricStorage::new(kind));
        Ok(storage.handle())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    #[must_use]
    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.kinds.get(name).map(|k| *k)
    }

    /// Writer handle for a registered metric's base series.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<MetricHandle> {
        let key = SeriesKey {
            name: Arc::from(name),
            endpoint: None,
        };
        self.series.get(&key).map(|s| s.handle())
    }

    /// Writer handle for an endpoint-scoped sub-series, created on first use
    /// with the metric's registered kind.
    #[must_use]
    pub fn endpoint_handle(&self, name: &str, endpoint: &str) -> Option<MetricHandle> {
        let kind = self.kind(name)?;
        let key = SeriesKey {
            name: Arc::from(name),
            endpoint: Some(Arc::from(endpoint)),
        };
        let storage = self
            .series
            .entry(key)
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    /// Read-consistent view of every series, sorted by name then endpoint.
    /// Each series value is read atomically; the snapshot as a whole is not a
    /// cross-series transaction, which is fine for commutative updates.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MetricSeriesSummary> {
        let mut out: Vec<MetricSeriesSummary> = self
            .series
            .iter()
            .map(|entry| MetricSeriesSummary {
                name: entry.key().name.to_string(),
                endpoint: entry.key().endpoint.as_deref().map(str::to_string),
                kind: entry.value().kind(),
                values: entry.value().value(),
            })
            .collect();

        out.sort_by(|a, b| (&a.name, &a.endpoint).cmp(&(&b.name, &b.endpoint)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_for_same_kind() {
        let reg = Registry::default();
        let a = reg.register("iterations", MetricKind::Counter);
        let b = reg.register("iterations", MetricKind::Counter);
        assert!(a.is_ok());
        assert!(b.is_ok());

        match (a, b) {
            (Ok(a), Ok(b)) => {
                a.increment(1);
                b.increment(2);
                assert_eq!(a.counter_value(), 3);
            }
            _ => panic!("expected handles"),
        }
    }

    #[test]
    fn register_rejects_kind_mismatch() {
        let reg = Registry::default();
        let _ = reg.register("errors", MetricKind::Rate);
        let err = reg.register("errors", MetricKind::Counter);
        assert!(matches!(err, Err(Error::KindMismatch { .. })));
    }

    #[test]
    fn endpoint_series_are_separate_from_base() {
        let reg = Registry::default();
        let base = match reg.register("http_req_duration", MetricKind::Trend) {
            Ok(h) => h,
            Err(e) => panic!("{e}"),
        };
        base.observe(100);

        let Some(tagged) = reg.endpoint_handle("http_req_duration", "profile") else {
            panic!("expected endpoint handle");
        };
        tagged.observe(200);
        tagged.observe(300);

        let snapshot = reg.snapshot();
        assert_eq!(snapshot.len(), 2);

        let base_series = snapshot.iter().find(|s| s.endpoint.is_none());
        let tagged_series = snapshot
            .iter()
            .find(|s| s.endpoint.as_deref() == Some("profile"));

        match base_series.map(|s| &s.values) {
            Some(MetricValue::Trend(t)) => assert_eq!(t.count, 1),
            _ => panic!("expected base trend"),
        }
        match tagged_series.map(|s| &s.values) {
            Some(MetricValue::Trend(t)) => assert_eq!(t.count, 2),
            _ => panic!("expected tagged trend"),
        }
    }

    #[test]
    fn endpoint_handle_requires_registration() {
        let reg = Registry::default();
        assert!(reg.endpoint_handle("nope", "x").is_none());
    }

    #[test]
    fn concurrent_writers_lose_no_updates() {
        let reg = Arc::new(Registry::default());
        let handle = match reg.register("http_reqs", MetricKind::Counter) {
            Ok(h) => h,
            Err(e) => panic!("{e}"),
        };

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let h = handle.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        h.increment(1);
                    }
                })
            })
            .collect();
        for t in threads {
            let _ = t.join();
        }

        assert_eq!(handle.counter_value(), 80_000);
    }
}
