use std::fmt;
use clap::ValueEnum;

/// How the launcher waits once every run has been started
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum WaitPolicy {
    /// Sleep for the fixed schedule and exit without joining the runs
    Fixed,
    /// Join every run under the wall time deadline and report failures
    Supervised,
}

impl fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WaitPolicy::Fixed => write!(f, "fixed"),
            WaitPolicy::Supervised => write!(f, "supervised"),
        }
    }
}
