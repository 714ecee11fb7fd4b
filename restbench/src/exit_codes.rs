use restbench_core::Totals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more attempts failed (transport error, rejected or unexpected status).
    AttemptsFailed = 10,

    /// Invalid CLI input (bad flags, malformed URL or header, invalid durations, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, worker spawn failures, report write failures).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_totals(totals: Totals) -> Self {
        if totals.failures > 0 {
            Self::AttemptsFailed
        } else {
            Self::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_decide_the_exit_code() {
        let clean = Totals {
            attempts: 5,
            failures: 0,
        };
        assert_eq!(ExitCode::from_totals(clean), ExitCode::Success);

        let failed = Totals {
            attempts: 5,
            failures: 1,
        };
        assert_eq!(ExitCode::from_totals(failed).as_i32(), 10);
    }
}
