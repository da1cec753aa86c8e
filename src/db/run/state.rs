use crate::launch::report::RunOutcome;

/// A run's state as stored in the `state` column
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Launched,
    NotStarted,
    Succeeded,
    Failed,
    Killed,
    Running,
    Unknown,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Launched => "launched",
            RunState::NotStarted => "not_started",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Killed => "killed",
            RunState::Running => "running",
            RunState::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<RunState> {
        let state = match value {
            "launched" => RunState::Launched,
            "not_started" => RunState::NotStarted,
            "succeeded" => RunState::Succeeded,
            "failed" => RunState::Failed,
            "killed" => RunState::Killed,
            "running" => RunState::Running,
            "unknown" => RunState::Unknown,
            _ => return None,
        };
        Some(state)
    }
}

impl From<&RunOutcome> for RunState {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Succeeded => RunState::Succeeded,
            RunOutcome::Failed { .. } => RunState::Failed,
            RunOutcome::Killed => RunState::Killed,
            RunOutcome::Running => RunState::Running,
            RunOutcome::NotStarted(_) => RunState::NotStarted,
            RunOutcome::Unknown => RunState::Unknown,
        }
    }
}
