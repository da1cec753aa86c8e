use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// SBATCH directives, consumed by the scheduler before the job body runs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceRequest {
    #[serde(default = "default_job_name")]
    pub job_name: String,
    pub time: String,
    pub nodes: u32,
    pub ntasks: u32,
    pub mem: String,
    pub gpus: u32,
    pub gpu_class: String,
    pub partition: String,
    #[serde(default = "default_output")]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Environment {
    pub work_dir: PathBuf,
    /// Environment module that provides the container runtime
    #[serde(default)]
    pub module: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Container {
    #[serde(default = "default_runtime")]
    pub runtime: String,
    pub image: PathBuf,
    /// Pass the host GPU through to the container (`--nv`)
    #[serde(default = "default_true")]
    pub gpu: bool,
}

/// The training program started inside each container
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Program {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_script")]
    pub script: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

impl Default for Program {
    fn default() -> Self {
        Program { interpreter: default_interpreter(), script: default_script(), mode: default_mode() }
    }
}

/// One training run: a unique label and the curriculum stage it trains on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunSpec {
    pub run_name: String,
    pub curriculum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Schedule {
    pub first_wait: String,
    pub final_wait: String,
}

/// Commands run for the host and GPU diagnostics, as argv
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Diagnostics {
    #[serde(default = "default_host")]
    pub host: Vec<String>,
    #[serde(default = "default_gpu")]
    pub gpu: Vec<String>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics { host: default_host(), gpu: default_gpu() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LaunchPlan {
    pub resources: ResourceRequest,
    pub environment: Environment,
    pub container: Container,
    #[serde(default)]
    pub program: Program,
    pub runs: Vec<RunSpec>,
    pub schedule: Schedule,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

fn default_job_name() -> String { "static-exp".to_string() }

fn default_output() -> String { "slurm-%j.out".to_string() }

fn default_runtime() -> String { "singularity".to_string() }

fn default_true() -> bool { true }

fn default_interpreter() -> String { "python3".to_string() }

fn default_script() -> String { "src/main.py".to_string() }

fn default_mode() -> String { "all".to_string() }

fn default_host() -> Vec<String> { vec!["hostname".to_string()] }

fn default_gpu() -> Vec<String> { vec!["nvidia-smi".to_string()] }
