//! Launch a batch of curriculum training runs on a SLURM GPU node
//!
//! The same launch plan can be rendered into a classic `sbatch` job script or executed directly,
//! in which case every container run is tracked and its outcome stored in a SQLite ledger.

use std::path::PathBuf;

/// Launch plans: resource requests, container invocations and schedule
pub mod plan;
/// Render job scripts and submit them with sbatch
pub mod slurm;
/// Prepare the environment, start container runs and wait for them
pub mod launch;
/// Ledger of launched runs
pub mod db;
pub mod policy;

/// The directory every run is started in, and where the ledger lives
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    pub path: PathBuf,
}
