use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::policy::WaitPolicy;

/// What became of a run by the time the launcher stopped looking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// Exited non-zero, or was killed by someone else (no exit code)
    Failed { code: Option<i32> },
    /// Killed by the launcher at the deadline or on shutdown
    Killed,
    /// Still alive when a fixed launcher exited
    Running,
    /// The container runtime couldn't be started
    NotStarted(String),
    /// The launcher lost track of the run (couldn't wait on or kill it)
    Unknown,
}

impl RunOutcome {
    pub fn from_status(status: ExitStatus) -> RunOutcome {
        match status.success() {
            true => RunOutcome::Succeeded,
            false => RunOutcome::Failed { code: status.code() },
        }
    }

    /// Anything but a clean exit or a run left running by a fixed launcher
    pub fn is_failure(&self) -> bool {
        !matches!(self, RunOutcome::Succeeded | RunOutcome::Running)
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunOutcome::Succeeded => Some(0),
            RunOutcome::Failed { code } => *code,
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunOutcome::Succeeded => write!(f, "succeeded"),
            RunOutcome::Failed { code: Some(code) } => write!(f, "failed with exit code {code}"),
            RunOutcome::Failed { code: None } => write!(f, "failed (terminated by signal)"),
            RunOutcome::Killed => write!(f, "killed"),
            RunOutcome::Running => write!(f, "still running"),
            RunOutcome::NotStarted(reason) => write!(f, "not started: {reason}"),
            RunOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_name: String,
    pub curriculum: u32,
    pub pid: Option<u32>,
    pub outcome: RunOutcome,
    pub launched_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Launcher stages, in the order they can happen
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Prepared,
    Diagnosed,
    Launched,
    FirstWaitElapsed,
    GpuDiagnostic,
    FinalWaitElapsed,
    AllRunsExited,
    DeadlineReached,
    ShutdownRequested,
    Finished,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PhaseEvent {
    pub phase: Phase,
    /// time since the launcher was created
    pub at: Duration,
}

#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub batch: String,
    pub policy: WaitPolicy,
    pub runs: Vec<RunReport>,
    pub phases: Vec<PhaseEvent>,
}

impl LaunchReport {
    pub fn failed(&self) -> Vec<&RunReport> {
        self.runs.iter().filter(|run| run.outcome.is_failure()).collect()
    }

    /// A fixed launcher never fails because of its runs; a supervised one fails if any run did
    pub fn is_success(&self) -> bool {
        match self.policy {
            WaitPolicy::Fixed => true,
            WaitPolicy::Supervised => self.failed().is_empty(),
        }
    }

    pub fn phase_at(&self, phase: Phase) -> Option<Duration> {
        self.phases.iter().find(|event| event.phase == phase).map(|event| event.at)
    }

    pub fn log_summary(&self) {
        info!("Batch {} finished ({} wait policy)", self.batch, self.policy);
        for run in &self.runs {
            match run.outcome.is_failure() {
                true => warn!("{} (curriculum {}): {}", run.run_name, run.curriculum, run.outcome),
                false => info!("{} (curriculum {}): {}", run.run_name, run.curriculum, run.outcome),
            }
        }
    }
}
