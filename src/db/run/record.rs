use log::info;
use rusqlite::{params, Connection};

use crate::db::open::with_savepoint;
use crate::db::run::state::RunState;
use crate::launch::report::LaunchReport;
use crate::launch::supervisor::RunHandle;

/// Insert a row for every run of a batch, started or not
///
/// A requeued SLURM job keeps its id, so an existing row for the same batch and run is reset.
pub fn record_launches(conn: &Connection, batch: &str, handles: &[RunHandle]) -> rusqlite::Result<()> {
    with_savepoint(conn, "record_launches", |conn| {
        for handle in handles {
            let state = match handle.is_started() {
                true => RunState::Launched,
                false => RunState::NotStarted,
            };
            info!("Recording {} in batch {batch} as {}", handle.run_name, state.as_str());
            conn.execute(
                "INSERT INTO run (batch, run_name, curriculum, pid, state, launched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (batch, run_name) DO UPDATE SET
                     curriculum = excluded.curriculum,
                     pid = excluded.pid,
                     state = excluded.state,
                     exit_code = NULL,
                     launched_at = excluded.launched_at,
                     finished_at = NULL",
                params![batch, handle.run_name, handle.curriculum, handle.pid, state.as_str(), handle.launched_at.to_rfc3339()],
            )?;
        }
        Ok(())
    })
}

/// Store the outcome of every run in a finished batch
pub fn record_outcomes(conn: &Connection, report: &LaunchReport) -> rusqlite::Result<()> {
    with_savepoint(conn, "record_outcomes", |conn| {
        for run in &report.runs {
            let state = RunState::from(&run.outcome);
            info!("Updating {} in batch {} with state {}", run.run_name, report.batch, state.as_str());
            conn.execute(
                "UPDATE run SET state = ?1, exit_code = ?2, finished_at = ?3 WHERE batch = ?4 AND run_name = ?5",
                params![
                    state.as_str(),
                    run.outcome.exit_code(),
                    run.finished_at.map(|at| at.to_rfc3339()),
                    report.batch,
                    run.run_name
                ],
            )?;
        }
        Ok(())
    })
}
