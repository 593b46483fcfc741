use std::time::Duration;

use crate::config::Stage;

/// Piecewise-linear VU target over the run. Each stage ramps from the
/// previous stage's target (the configured flat count before the first
/// stage) to its own target across its duration.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    initial: u64,
    stages: Vec<Stage>,
}

impl RampSchedule {
    #[must_use]
    pub fn new(initial: u64, stages: Vec<Stage>) -> Self {
        Self { initial, stages }
    }

    /// Target VU count at `elapsed` into the run. Past the last stage the
    /// final target holds.
    #[must_use]
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let mut from = self.initial;
        let mut offset = Duration::ZERO;

        for stage in &self.stages {
            let end = offset + stage.duration;
            if elapsed < end {
                let span = stage.duration.as_secs_f64();
                if span <= 0.0 {
                    return stage.target;
                }
                let progress = (elapsed - offset).as_secs_f64() / span;
                let from_f = from as f64;
                let to_f = stage.target as f64;
                let value = from_f + (to_f - from_f) * progress;
                return value.round().max(0.0) as u64;
            }
            from = stage.target;
            offset = end;
        }

        from
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(secs: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_secs(secs),
            target,
        }
    }

    #[test]
    fn flat_schedule_holds_initial() {
        let s = RampSchedule::new(5, Vec::new());
        assert_eq!(s.target_at(Duration::ZERO), 5);
        assert_eq!(s.target_at(Duration::from_secs(100)), 5);
    }

    #[test]
    fn ramp_interpolates_linearly() {
        let s = RampSchedule::new(0, vec![stage(10, 10)]);
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_secs(5)), 5);
        assert_eq!(s.target_at(Duration::from_secs(9)), 9);
        // Past the end the last target holds.
        assert_eq!(s.target_at(Duration::from_secs(10)), 10);
        assert_eq!(s.target_at(Duration::from_secs(60)), 10);
    }

    #[test]
    fn ramp_down_reaches_zero() {
        let s = RampSchedule::new(0, vec![stage(10, 10), stage(10, 0)]);
        assert_eq!(s.target_at(Duration::from_secs(15)), 5);
        assert_eq!(s.target_at(Duration::from_secs(20)), 0);
    }
}
