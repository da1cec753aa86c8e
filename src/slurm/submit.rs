use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::info;

use crate::slurm::script::JobPath;

#[derive(Debug)]
pub enum SubmitError {
    /// sbatch couldn't be started at all
    Spawn { sbatch: PathBuf, reason: String },
    /// sbatch ran but rejected the job
    Rejected { status: Option<i32>, stderr: String },
    /// sbatch succeeded but didn't print a job id
    BadOutput(String),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubmitError::Spawn { sbatch, reason } => write!(f, "can't run {}: {}", sbatch.display(), reason),
            SubmitError::Rejected { status: Some(code), stderr } => write!(f, "sbatch exited with status {code}: {}", stderr.trim()),
            SubmitError::Rejected { status: None, stderr } => write!(f, "sbatch was killed by a signal: {}", stderr.trim()),
            SubmitError::BadOutput(out) => write!(f, "can't find a job id in sbatch output {out:?}"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Submit a job script, returning the SLURM job id
///
/// sbatch runs from the script's directory so relative output paths land next to `job.sh`.
pub fn submit(job_path: &JobPath, sbatch: &Path) -> Result<String, SubmitError> {
    let mut cmd = sbatch_command(job_path, sbatch);

    info!("Running sbatch process");
    info!("{:?}", &cmd);
    let output = cmd.output().map_err(|err| SubmitError::Spawn {
        sbatch: sbatch.to_path_buf(),
        reason: err.to_string(),
    })?;

    if !output.status.success() {
        return Err(SubmitError::Rejected {
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let job_id = parse_job_id(&String::from_utf8_lossy(&output.stdout))?;
    info!("SLURM job id: {job_id}");
    Ok(job_id)
}

/// `sbatch --parsable job.sh`, run from the script's directory
///
/// The script is passed by file name only since the path may be relative to our own directory.
pub fn sbatch_command(job_path: &JobPath, sbatch: &Path) -> Command {
    let mut cmd = Command::new(sbatch);
    cmd.arg("--parsable");
    match (job_path.path.parent(), job_path.path.file_name()) {
        (Some(wd), Some(file_name)) if !wd.as_os_str().is_empty() => {
            cmd.current_dir(wd).arg(file_name);
        }
        _ => {
            cmd.arg(&job_path.path);
        }
    }
    cmd
}

/// `--parsable` prints `jobid` or `jobid;cluster`
fn parse_job_id(stdout: &str) -> Result<String, SubmitError> {
    let line = stdout.trim();
    let id = line.split(';').next().unwrap_or_default();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SubmitError::BadOutput(line.to_string()));
    }
    Ok(id.to_string())
}
