//! Run a launch plan directly on the allocated node
//!
//! Launching goes through the same stages as the batch script it replaces: prepare the
//! environment, print diagnostics, start every run without waiting on the others, then wait.
//! How the launcher waits is chosen with a [`WaitPolicy`].

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use log::{info, warn};

use crate::db::open::open_db;
use crate::db::run::record::{record_launches, record_outcomes};
use crate::launch::report::LaunchReport;
use crate::launch::supervisor::{Launcher, WaitSchedule};
use crate::plan::job::LaunchPlan;
use crate::policy::WaitPolicy;

/// Container command lines
pub mod invocation;
/// Working directory, module and runtime preconditions
pub mod environment;
/// Host and GPU diagnostics
pub mod diagnostics;
/// Start runs and wait for them
pub mod supervisor;
/// Run outcomes and the phase log
pub mod report;

#[derive(Debug)]
pub enum LaunchError {
    WorkDirMissing(PathBuf),
    ModuleUnavailable { module: String, reason: String },
    RuntimeUnavailable(String),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LaunchError::WorkDirMissing(path) => write!(f, "working directory {} doesn't exist", path.display()),
            LaunchError::ModuleUnavailable { module, reason } => write!(f, "can't load module {module}: {reason}"),
            LaunchError::RuntimeUnavailable(runtime) => write!(f, "container runtime {runtime} isn't on PATH"),
        }
    }
}

impl std::error::Error for LaunchError {}

/// Launch a whole batch: prepare, diagnose, start every run, wait, and record it all in the ledger
///
/// Fails before starting anything if the environment isn't usable. Ledger problems are only
/// logged since the runs are already going by then.
pub async fn launch_plan<F>(
    plan: LaunchPlan,
    schedule: WaitSchedule,
    policy: WaitPolicy,
    batch: String,
    shutdown: F,
) -> Result<LaunchReport, LaunchError>
where
    F: Future<Output = ()>,
{
    let resources = &plan.resources;
    info!(
        "Resources: {} node(s), {} task(s), {} memory, {} GPU(s) of class {} on partition {} for {}",
        resources.nodes, resources.ntasks, resources.mem, resources.gpus,
        resources.gpu_class, resources.partition, resources.time
    );
    let env = environment::prepare(&plan).await?;

    let conn = match open_db(&env.work_dir) {
        Ok(conn) => Some(conn),
        Err(err) => {
            warn!("Can't open run ledger, runs won't be recorded: {err}");
            None
        }
    };

    let mut launcher = Launcher::new(plan, env, schedule, batch);
    launcher.diagnose().await;
    let handles = launcher.spawn_all();

    if let Some(conn) = &conn {
        if let Err(err) = record_launches(conn, launcher.batch(), &handles) {
            warn!("Can't record launches: {err}");
        }
    }

    let report = launcher.wait(handles, policy, shutdown).await;

    if let Some(conn) = &conn {
        if let Err(err) = record_outcomes(conn, &report) {
            warn!("Can't record outcomes: {err}");
        }
    }

    report.log_summary();
    Ok(report)
}
