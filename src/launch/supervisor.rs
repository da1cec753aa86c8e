use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, Instant};

use crate::launch::diagnostics::{emit, Diagnostic};
use crate::launch::environment::PreparedEnvironment;
use crate::launch::invocation::Invocation;
use crate::launch::report::{LaunchReport, Phase, PhaseEvent, RunOutcome, RunReport};
use crate::plan::job::LaunchPlan;
use crate::plan::read::PlanError;
use crate::plan::walltime::format_walltime;
use crate::policy::WaitPolicy;

/// How long the launcher waits, and when a supervised launcher gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSchedule {
    pub first_wait: Duration,
    pub final_wait: Duration,
    pub deadline: Duration,
}

/// Time left for killing runs and recording outcomes before SLURM's own wall time kill
const DEADLINE_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Stand-in for deadlines too far away to represent as an instant
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 86_400);

impl WaitSchedule {
    /// The deadline is the job's wall time less a margin: 5 minutes, or a tenth of short wall times
    pub fn from_plan(plan: &LaunchPlan) -> Result<WaitSchedule, PlanError> {
        let wall_time = plan.wall_time()?;
        let margin = DEADLINE_MARGIN.min(wall_time / 10);
        Ok(WaitSchedule {
            first_wait: plan.first_wait()?,
            final_wait: plan.final_wait()?,
            deadline: wall_time - margin,
        })
    }
}

/// A started run
#[derive(Debug)]
pub struct RunHandle {
    pub run_name: String,
    pub curriculum: u32,
    pub pid: Option<u32>,
    pub launched_at: DateTime<Utc>,
    child: Option<Child>,
    not_started: Option<String>,
}

impl RunHandle {
    pub fn is_started(&self) -> bool {
        self.child.is_some()
    }

    fn report(&self, outcome: RunOutcome, finished_at: Option<DateTime<Utc>>) -> RunReport {
        RunReport {
            run_name: self.run_name.clone(),
            curriculum: self.curriculum,
            pid: self.pid,
            outcome,
            launched_at: self.launched_at,
            finished_at,
        }
    }
}

/// Batch identifier: the SLURM job id when running inside an allocation, a timestamp otherwise
pub fn batch_id() -> String {
    std::env::var("SLURM_JOB_ID")
        .unwrap_or_else(|_| Utc::now().format("local-%Y%m%dT%H%M%S").to_string())
}

pub struct Launcher {
    plan: LaunchPlan,
    env: PreparedEnvironment,
    schedule: WaitSchedule,
    batch: String,
    started: std::time::Instant,
    phases: Vec<PhaseEvent>,
}

impl Launcher {
    pub fn new(plan: LaunchPlan, env: PreparedEnvironment, schedule: WaitSchedule, batch: String) -> Launcher {
        let mut launcher = Launcher { plan, env, schedule, batch, started: std::time::Instant::now(), phases: Vec::new() };
        launcher.enter(Phase::Prepared);
        launcher
    }

    pub fn batch(&self) -> &str {
        &self.batch
    }

    fn enter(&mut self, phase: Phase) {
        let at = self.started.elapsed();
        debug!("{phase:?} after {at:?}");
        self.phases.push(PhaseEvent { phase, at });
    }

    /// Print which node we landed on and the state of its GPUs
    pub async fn diagnose(&mut self) {
        emit(Diagnostic::Host, &self.plan.diagnostics.host, &self.env).await;
        emit(Diagnostic::Gpu, &self.plan.diagnostics.gpu, &self.env).await;
        self.enter(Phase::Diagnosed);
    }

    /// Start every run without waiting on any of them
    ///
    /// A run whose runtime can't be started is reported as not started; the others still go ahead.
    pub fn spawn_all(&mut self) -> Vec<RunHandle> {
        let invocations: Vec<Invocation> = self.plan.runs.iter()
            .map(|run| Invocation::for_run(&self.plan, run))
            .collect();

        let handles: Vec<RunHandle> = invocations.iter().map(|invocation| self.spawn(invocation)).collect();
        self.enter(Phase::Launched);
        handles
    }

    fn spawn(&self, invocation: &Invocation) -> RunHandle {
        info!("Launching {}: {}", invocation.run_name, invocation.shell_line());
        let mut cmd = Command::new(&self.env.runtime);
        cmd.args(&invocation.args).stdin(Stdio::null());
        self.env.apply(&mut cmd);

        let launched_at = Utc::now();
        match cmd.spawn() {
            Ok(child) => RunHandle {
                run_name: invocation.run_name.clone(),
                curriculum: invocation.curriculum,
                pid: child.id(),
                launched_at,
                child: Some(child),
                not_started: None,
            },
            Err(err) => {
                warn!("Can't start run {}: {}", invocation.run_name, err);
                RunHandle {
                    run_name: invocation.run_name.clone(),
                    curriculum: invocation.curriculum,
                    pid: None,
                    launched_at,
                    child: None,
                    not_started: Some(err.to_string()),
                }
            }
        }
    }

    /// Wait for started runs according to the policy and report what happened to each
    ///
    /// `shutdown` is only polled by a supervised launcher.
    pub async fn wait<F>(mut self, handles: Vec<RunHandle>, policy: WaitPolicy, shutdown: F) -> LaunchReport
    where
        F: Future<Output = ()>,
    {
        let runs = match policy {
            WaitPolicy::Fixed => self.wait_fixed(handles).await,
            WaitPolicy::Supervised => self.supervise(handles, shutdown).await,
        };
        self.enter(Phase::Finished);

        LaunchReport { batch: self.batch, policy, runs, phases: self.phases }
    }

    /// Sleep through the schedule without joining the runs, then note whatever is known about them
    async fn wait_fixed(&mut self, handles: Vec<RunHandle>) -> Vec<RunReport> {
        info!("Sleeping for {}", format_walltime(self.schedule.first_wait));
        sleep(self.schedule.first_wait).await;
        self.enter(Phase::FirstWaitElapsed);

        emit(Diagnostic::Gpu, &self.plan.diagnostics.gpu, &self.env).await;
        self.enter(Phase::GpuDiagnostic);

        info!("Sleeping for {}", format_walltime(self.schedule.final_wait));
        sleep(self.schedule.final_wait).await;
        self.enter(Phase::FinalWaitElapsed);

        handles.into_iter().map(observe).collect()
    }

    /// Join every run, stopping early at the deadline or on shutdown
    async fn supervise<F>(&mut self, handles: Vec<RunHandle>, shutdown: F) -> Vec<RunReport>
    where
        F: Future<Output = ()>,
    {
        info!("Supervising {} runs, deadline in {}", handles.len(), format_walltime(self.schedule.deadline));
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut reports: Vec<Option<RunReport>> = vec![None; handles.len()];
        let mut waits = JoinSet::new();

        for (index, mut handle) in handles.into_iter().enumerate() {
            let Some(child) = handle.child.take() else {
                let reason = handle.not_started.clone().unwrap_or_default();
                reports[index] = Some(handle.report(RunOutcome::NotStarted(reason), None));
                continue;
            };
            let stop = stop_rx.clone();
            waits.spawn(async move {
                let outcome = watch_child(child, stop).await;
                info!("Run {} {}", handle.run_name, outcome);
                (index, handle.report(outcome, Some(Utc::now())))
            });
        }

        let checkpoint = sleep(self.schedule.first_wait);
        // the deadline counts from when the launcher was created, not from here
        let deadline_at = Instant::from_std(self.started)
            .checked_add(self.schedule.deadline)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE);
        let deadline = sleep_until(deadline_at);
        tokio::pin!(checkpoint, deadline, shutdown);
        let mut checkpoint_done = false;

        loop {
            tokio::select! {
                joined = waits.join_next() => match joined {
                    Some(Ok((index, report))) => reports[index] = Some(report),
                    Some(Err(err)) => warn!("Run supervision task failed: {err}"),
                    None => {
                        self.enter(Phase::AllRunsExited);
                        break;
                    }
                },
                _ = &mut checkpoint, if !checkpoint_done => {
                    checkpoint_done = true;
                    self.enter(Phase::FirstWaitElapsed);
                    emit(Diagnostic::Gpu, &self.plan.diagnostics.gpu, &self.env).await;
                    self.enter(Phase::GpuDiagnostic);
                }
                _ = &mut deadline => {
                    warn!("Deadline reached, killing remaining runs");
                    self.enter(Phase::DeadlineReached);
                    break;
                }
                _ = &mut shutdown => {
                    warn!("Shutdown requested, killing remaining runs");
                    self.enter(Phase::ShutdownRequested);
                    break;
                }
            }
        }

        // no-op when every run has already exited
        let _ = stop_tx.send(true);
        while let Some(joined) = waits.join_next().await {
            match joined {
                Ok((index, report)) => reports[index] = Some(report),
                Err(err) => warn!("Run supervision task failed: {err}"),
            }
        }

        reports.into_iter().flatten().collect()
    }
}

/// Wait for a child to exit, killing it once `stop` flips
async fn watch_child(mut child: Child, mut stop: watch::Receiver<bool>) -> RunOutcome {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => RunOutcome::from_status(status),
            Err(err) => {
                warn!("Can't wait on run: {err}");
                RunOutcome::Unknown
            }
        },
        _ = stop_requested(&mut stop) => {
            match child.kill().await {
                Ok(()) => RunOutcome::Killed,
                Err(err) => {
                    warn!("Can't kill run: {err}");
                    RunOutcome::Unknown
                }
            }
        }
    }
}

/// Resolves once `stop` flips or its sender is gone, without holding the value across an await
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Check on a run without blocking
fn observe(mut handle: RunHandle) -> RunReport {
    let Some(mut child) = handle.child.take() else {
        let reason = handle.not_started.clone().unwrap_or_default();
        return handle.report(RunOutcome::NotStarted(reason), None);
    };

    match child.try_wait() {
        Ok(Some(status)) => handle.report(RunOutcome::from_status(status), Some(Utc::now())),
        Ok(None) => handle.report(RunOutcome::Running, None),
        Err(err) => {
            warn!("Can't check on run {}: {}", handle.run_name, err);
            handle.report(RunOutcome::Unknown, None)
        }
    }
}

/// Resolves on ctrl-c or SIGTERM (sent by SLURM before the wall time kill)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Can't listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Can't listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::plan::read::default_plan;

    use super::*;

    #[test]
    fn deadline_leaves_room_before_wall_time() {
        let mut plan = default_plan().unwrap();
        let schedule = WaitSchedule::from_plan(&plan).unwrap();
        assert_eq!(schedule.deadline, Duration::from_secs(48 * 3_600 - 5 * 60));
        assert_eq!(schedule.first_wait, Duration::from_secs(3 * 3_600));

        plan.resources.time = "00:10:00".to_string();
        let schedule = WaitSchedule::from_plan(&plan).unwrap();
        assert_eq!(schedule.deadline, Duration::from_secs(9 * 60));
    }

    #[tokio::test]
    async fn stop_request_resolves_when_flipped() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { stop_requested(&mut rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    }
}
