use std::fmt;

use rusqlite::{Connection, Row};

use crate::db::run::state::RunState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub batch: String,
    pub run_name: String,
    pub curriculum: u32,
    pub pid: Option<u32>,
    pub state: Option<RunState>,
    pub exit_code: Option<i32>,
    pub launched_at: String,
    pub finished_at: Option<String>,
}

impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.map(|s| s.as_str()).unwrap_or("?");
        write!(f, "{}\t{}\t{}\t{}", self.batch, self.run_name, self.curriculum, state)?;
        match self.exit_code {
            Some(code) => write!(f, "\t{code}")?,
            None => write!(f, "\t-")?,
        }
        write!(f, "\t{}\t{}", self.launched_at, self.finished_at.as_deref().unwrap_or("-"))
    }
}

/// Load recorded runs, optionally limited to one batch, oldest first
pub fn load_runs(conn: &Connection, batch: Option<&str>) -> rusqlite::Result<Vec<RunRecord>> {
    let columns = "batch, run_name, curriculum, pid, state, exit_code, launched_at, finished_at";
    match batch {
        Some(batch) => {
            let mut stmt = conn.prepare(&format!("SELECT {columns} FROM run WHERE batch = ?1 ORDER BY id"))?;
            let rows = stmt.query_map([batch], to_record)?;
            rows.collect()
        }
        None => {
            let mut stmt = conn.prepare(&format!("SELECT {columns} FROM run ORDER BY id"))?;
            let rows = stmt.query_map([], to_record)?;
            rows.collect()
        }
    }
}

fn to_record(row: &Row) -> rusqlite::Result<RunRecord> {
    let state: String = row.get(4)?;
    Ok(RunRecord {
        batch: row.get(0)?,
        run_name: row.get(1)?,
        curriculum: row.get(2)?,
        pid: row.get(3)?,
        state: RunState::parse(&state),
        exit_code: row.get(5)?,
        launched_at: row.get(6)?,
        finished_at: row.get(7)?,
    })
}
