#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more checks failed.
    ChecksFailed = 10,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// Checks and thresholds failed.
    ChecksAndThresholdsFailed = 12,

    /// Scenario setup failed; no load was generated.
    SetupFailed = 20,

    /// Invalid CLI/config input (bad flags, durations, threshold syntax).
    InvalidInput = 30,

    /// Internal error (IO errors, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_quality_gates(checks_failed: bool, thresholds_failed: bool) -> Self {
        match (checks_failed, thresholds_failed) {
            (false, false) => Self::Success,
            (true, false) => Self::ChecksFailed,
            (false, true) => Self::ThresholdsFailed,
            (true, true) => Self::ChecksAndThresholdsFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_gates_map_to_codes() {
        assert_eq!(ExitCode::from_quality_gates(false, false), ExitCode::Success);
        assert_eq!(
            ExitCode::from_quality_gates(true, false),
            ExitCode::ChecksFailed
        );
        assert_eq!(
            ExitCode::from_quality_gates(false, true),
            ExitCode::ThresholdsFailed
        );
        assert_eq!(
            ExitCode::from_quality_gates(true, true),
            ExitCode::ChecksAndThresholdsFailed
        );
    }
}
