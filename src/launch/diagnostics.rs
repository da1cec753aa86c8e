use std::fmt;

use log::{info, warn};
use tokio::process::Command;

use crate::launch::environment::PreparedEnvironment;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    Host,
    Gpu,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Diagnostic::Host => write!(f, "host"),
            Diagnostic::Gpu => write!(f, "gpu"),
        }
    }
}

/// Run a diagnostic command with its output going straight to the job log
///
/// A failing diagnostic is only logged: the job carries on, like the batch script would.
/// Returns whether the command ran and exited 0.
pub async fn emit(kind: Diagnostic, argv: &[String], env: &PreparedEnvironment) -> bool {
    let Some((program, args)) = argv.split_first() else {
        warn!("No {kind} diagnostic configured");
        return false;
    };

    info!("Running {kind} diagnostic: {}", argv.join(" "));
    let mut cmd = Command::new(program);
    cmd.args(args);
    env.apply(&mut cmd);

    match cmd.status().await {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!("{kind} diagnostic exited with {status}");
            false
        }
        Err(err) => {
            warn!("Can't run {kind} diagnostic {program}: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use crate::WorkingDirectory;

    use super::*;

    fn env_in(path: PathBuf) -> PreparedEnvironment {
        PreparedEnvironment { work_dir: WorkingDirectory { path }, module_env: None, runtime: PathBuf::from("/bin/true") }
    }

    #[tokio::test]
    async fn runs_in_work_dir() {
        let dir = tempdir().unwrap();
        let argv = vec!["sh".to_string(), "-c".to_string(), "pwd > where.txt".to_string()];
        assert!(emit(Diagnostic::Host, &argv, &env_in(dir.path().to_path_buf())).await);

        let written = std::fs::read_to_string(dir.path().join("where.txt")).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(written.trim()).canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    async fn failures_are_not_fatal() {
        let dir = tempdir().unwrap();
        let env = env_in(dir.path().to_path_buf());
        assert!(!emit(Diagnostic::Gpu, &["false".to_string()], &env).await);
        assert!(!emit(Diagnostic::Gpu, &["/no/such/nvidia-smi".to_string()], &env).await);
        assert!(!emit(Diagnostic::Gpu, &[], &env).await);
    }
}
