use async_trait::async_trait;
use rand::Rng as _;
use rand::SeedableRng as _;
use rand::rngs::SmallRng;
use stampede_metrics::Registry;

use crate::executor::{RequestOutcome, ScenarioEnv};

/// Setup failure is fatal for the whole run: if the target cannot even be
/// primed, load numbers against it would be meaningless.
#[derive(Debug, thiserror::Error)]
#[error("scenario setup failed at `{step}`: {reason}")]
pub struct SetupError {
    pub step: &'static str,
    pub reason: String,
}

impl SetupError {
    #[must_use]
    pub fn new(step: &'static str, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
        }
    }
}

/// The user-facing seam: a scenario defines what one virtual user does.
///
/// `setup` runs exactly once before any virtual user starts and its output
/// is shared read-only by every user. `iterate` is one pass through the
/// scripted behavior; it returns every request outcome it produced so the
/// engine can record them uniformly.
#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    type Setup: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Register scenario-owned metrics (for example a custom error rate)
    /// before validation runs, so thresholds may reference them.
    fn register_metrics(&self, metrics: &Registry) -> stampede_metrics::Result<()>;

    async fn setup(
        &self,
        env: &ScenarioEnv,
        credentials: &[(String, String)],
    ) -> Result<Self::Setup, SetupError>;

    async fn iterate(
        &self,
        env: &ScenarioEnv,
        setup: &Self::Setup,
        rng: &mut SmallRng,
    ) -> Vec<RequestOutcome>;
}

/// Deterministic per-iteration seed. Two runs with the same shape make the
/// same branch decisions, which keeps traffic mixes reproducible.
#[must_use]
pub fn iteration_seed(vu_id: u64, iteration: u64) -> u64 {
    // splitmix64 of the packed pair; cheap and well distributed.
    let mut x = (vu_id << 32) ^ iteration;
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[must_use]
pub fn iteration_rng(vu_id: u64, iteration: u64) -> SmallRng {
    SmallRng::seed_from_u64(iteration_seed(vu_id, iteration))
}

/// Single weighted draw. Callers must draw exactly once per branch decision;
/// `probability` 0.0 never takes the branch and 1.0 always does.
#[must_use]
pub fn weighted_coin(rng: &mut SmallRng, probability: f64) -> bool {
    rng.random::<f64>() < probability
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic_and_distinct() {
        assert_eq!(iteration_seed(3, 7), iteration_seed(3, 7));
        assert_ne!(iteration_seed(3, 7), iteration_seed(7, 3));
        assert_ne!(iteration_seed(1, 0), iteration_seed(0, 1));
    }

    #[test]
    fn coin_at_extremes() {
        let mut rng = iteration_rng(1, 1);
        for _ in 0..1000 {
            assert!(!weighted_coin(&mut rng, 0.0));
            assert!(weighted_coin(&mut rng, 1.0));
        }
    }

    #[test]
    fn coin_tracks_probability() {
        let mut hits = 0u32;
        let trials: u32 = 20_000;
        for i in 0..trials {
            let mut rng = iteration_rng(42, u64::from(i));
            if weighted_coin(&mut rng, 0.1) {
                hits += 1;
            }
        }
        let observed = f64::from(hits) / f64::from(trials);
        assert!(
            (observed - 0.1).abs() < 0.02,
            "observed branch rate {observed}"
        );
    }
}
