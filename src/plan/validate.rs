use std::collections::HashSet;
use std::time::Duration;

use crate::plan::job::LaunchPlan;
use crate::plan::read::PlanError;
use crate::plan::walltime::parse_walltime;

impl LaunchPlan {
    /// Check the constraints the JSON schema can't express
    ///
    /// Every run name and every curriculum stage must be unique, so labels and stages pair up 1:1.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.runs.is_empty() {
            return Err(PlanError::Invalid("a plan needs at least one run".to_string()));
        }

        let mut names = HashSet::new();
        let mut stages = HashSet::new();
        for run in &self.runs {
            if !names.insert(run.run_name.as_str()) {
                return Err(PlanError::Invalid(format!("duplicate run name {}", run.run_name)));
            }
            if !stages.insert(run.curriculum) {
                return Err(PlanError::Invalid(format!("curriculum stage {} is used by more than one run", run.curriculum)));
            }
        }

        if !self.environment.work_dir.is_absolute() {
            return Err(PlanError::Invalid(format!("working directory {} must be absolute", self.environment.work_dir.display())));
        }

        if let Some(module) = &self.environment.module {
            let allowed = |c: char| c.is_ascii_alphanumeric() || "._/+-".contains(c);
            if module.is_empty() || !module.chars().all(allowed) {
                return Err(PlanError::Invalid(format!("module name {module:?} contains unsupported characters")));
            }
        }

        self.wall_time()?;
        self.first_wait()?;
        self.final_wait()?;
        Ok(())
    }

    pub fn wall_time(&self) -> Result<Duration, PlanError> {
        parse_walltime(&self.resources.time).map_err(|err| PlanError::Invalid(err.to_string()))
    }

    pub fn first_wait(&self) -> Result<Duration, PlanError> {
        parse_walltime(&self.schedule.first_wait).map_err(|err| PlanError::Invalid(err.to_string()))
    }

    pub fn final_wait(&self) -> Result<Duration, PlanError> {
        parse_walltime(&self.schedule.final_wait).map_err(|err| PlanError::Invalid(err.to_string()))
    }
}
