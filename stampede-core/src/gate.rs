use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Wall-clock cutoff shared by every virtual user. Armed once when the run
/// actually starts, so setup time never eats into the measured window.
#[derive(Debug, Default)]
pub struct DurationGate {
    deadline: OnceLock<Instant>,
}

impl DurationGate {
    /// Arm the gate `total` from now. Later calls are ignored.
    pub fn arm(&self, total: Duration) {
        let _ = self.deadline.set(Instant::now() + total);
    }

    /// True once the armed deadline has passed. An unarmed gate never expires.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.deadline
            .get()
            .is_some_and(|deadline| Instant::now() >= *deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_gate_never_expires() {
        let gate = DurationGate::default();
        assert!(!gate.expired());
    }

    #[test]
    fn armed_gate_expires_after_duration() {
        let gate = DurationGate::default();
        gate.arm(Duration::ZERO);
        assert!(gate.expired());
    }

    #[test]
    fn rearming_is_ignored() {
        let gate = DurationGate::default();
        gate.arm(Duration::from_secs(3600));
        gate.arm(Duration::ZERO);
        assert!(!gate.expired());
    }
}
