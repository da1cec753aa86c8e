use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio::process::Command;

use crate::launch::LaunchError;
use crate::plan::job::LaunchPlan;
use crate::WorkingDirectory;

/// Everything a run needs from the node, checked before anything is started
#[derive(Debug, Clone)]
pub struct PreparedEnvironment {
    pub work_dir: WorkingDirectory,
    /// Environment captured after `module load`, replaces the inherited one for every child
    pub module_env: Option<HashMap<String, String>>,
    pub runtime: PathBuf,
}

impl PreparedEnvironment {
    /// Apply the working directory and module environment to a child command
    pub fn apply(&self, cmd: &mut Command) {
        cmd.current_dir(&self.work_dir.path);
        if let Some(vars) = &self.module_env {
            cmd.env_clear().envs(vars);
        }
    }

    fn path_var(&self) -> Option<OsString> {
        match &self.module_env {
            Some(vars) => vars.get("PATH").map(OsString::from),
            None => env::var_os("PATH"),
        }
    }
}

/// Check the working directory, load the runtime module and find the container runtime
///
/// Nothing in the launcher's own process is changed: the directory and module environment are
/// applied to each child instead.
pub async fn prepare(plan: &LaunchPlan) -> Result<PreparedEnvironment, LaunchError> {
    let work_dir = &plan.environment.work_dir;
    info!("Checking working directory {}", work_dir.display());
    if !work_dir.is_dir() {
        warn!("Working directory {} is missing, nothing will be launched", work_dir.display());
        return Err(LaunchError::WorkDirMissing(work_dir.clone()));
    }

    let module_env = match &plan.environment.module {
        Some(module) => Some(load_module(module).await?),
        None => None,
    };

    let mut prepared = PreparedEnvironment {
        work_dir: WorkingDirectory { path: work_dir.clone() },
        module_env,
        runtime: PathBuf::new(),
    };

    prepared.runtime = resolve_runtime(&plan.container.runtime, prepared.path_var(), work_dir)
        .ok_or_else(|| LaunchError::RuntimeUnavailable(plan.container.runtime.clone()))?;
    info!("Using container runtime {}", prepared.runtime.display());

    Ok(prepared)
}

/// Load an environment module in a login shell and capture the resulting environment
async fn load_module(module: &str) -> Result<HashMap<String, String>, LaunchError> {
    info!("Loading module {module}");
    // module output is chatter on stderr, env -0 is the only thing on stdout
    let script = format!("module load {module} 1>&2 && env -0");
    let output = Command::new("bash")
        .arg("-lc")
        .arg(&script)
        .output()
        .await
        .map_err(|err| LaunchError::ModuleUnavailable { module: module.to_string(), reason: err.to_string() })?;

    if !output.status.success() {
        let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!("module load {module} failed: {reason}");
        return Err(LaunchError::ModuleUnavailable { module: module.to_string(), reason });
    }

    Ok(parse_env(&output.stdout))
}

/// Parse NUL separated `KEY=value` pairs as printed by `env -0`
fn parse_env(raw: &[u8]) -> HashMap<String, String> {
    raw.split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            entry.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// Find the runtime binary the way a shell would: paths are used as-is, bare names go through PATH
fn resolve_runtime(runtime: &str, path_var: Option<OsString>, work_dir: &Path) -> Option<PathBuf> {
    if runtime.contains('/') {
        let candidate = work_dir.join(runtime);
        return candidate.is_file().then_some(candidate);
    }

    let path_var = path_var?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(runtime))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn parses_env_dump() {
        let vars = parse_env(b"PATH=/usr/bin:/opt/bin\0EMPTY=\0WITH_EQ=a=b\0\0");
        assert_eq!(vars.get("PATH").map(String::as_str), Some("/usr/bin:/opt/bin"));
        assert_eq!(vars.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(vars.get("WITH_EQ").map(String::as_str), Some("a=b"));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn resolves_runtime_on_path() {
        let dir = tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        fs::write(bin.join("apptainer"), "").unwrap();

        let path_var = env::join_paths([PathBuf::from("/nowhere"), bin.clone()]).unwrap();
        assert_eq!(resolve_runtime("apptainer", Some(path_var.clone()), dir.path()), Some(bin.join("apptainer")));
        assert_eq!(resolve_runtime("singularity", Some(path_var), dir.path()), None);
        assert_eq!(resolve_runtime("apptainer", None, dir.path()), None);
    }

    #[test]
    fn resolves_runtime_paths_against_work_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("runtime.sh"), "").unwrap();
        assert_eq!(resolve_runtime("./runtime.sh", None, dir.path()), Some(dir.path().join("./runtime.sh")));
        assert!(resolve_runtime("./missing.sh", None, dir.path()).is_none());
    }
}
