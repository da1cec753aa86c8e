use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::launch::invocation::{shell_quote, Invocation};
use crate::plan::job::LaunchPlan;
use crate::plan::read::PlanError;

/// A JobPath is the path to a job script that's submitted to SLURM via sbatch
#[derive(Debug, Clone)]
pub struct JobPath {
    pub path: PathBuf,
}

/// A complete rendered batch script
pub struct JobScript {
    header: Header,
    body: Body,
}

/// Rendered SBATCH header
///
/// SLURM jobs options are parsed by sbatch using #SBATCH headers [before executable commands](https://slurm.schedmd.com/sbatch.html#SECTION_DESCRIPTION).
/// Every directive comes from the plan's resource request. The GPU directive is left out when no
/// GPUs are requested.
struct Header {
    content: String,
}

/// Rendered job body
///
/// The body mirrors what `launch` does natively:
/// - change into the working directory and load the container runtime module
/// - print host and GPU diagnostics
/// - start every run in the background
/// - sleep, print GPU diagnostics again, sleep until the wall time runs out
struct Body {
    content: String,
}

#[derive(Debug)]
pub enum RenderError {
    Template(String),
    Plan(PlanError),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RenderError::Template(msg) => write!(f, "can't render job script: {msg}"),
            RenderError::Plan(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<tinytemplate::error::Error> for RenderError {
    fn from(err: tinytemplate::error::Error) -> Self {
        RenderError::Template(err.to_string())
    }
}

impl From<PlanError> for RenderError {
    fn from(err: PlanError) -> Self {
        RenderError::Plan(err)
    }
}

/// Rendering context for header
#[derive(Serialize)]
struct HeaderContext {
    job_name: String,
    time: String,
    nodes: u32,
    ntasks: u32,
    mem: String,
    gpus: u32,
    gpu_class: String,
    partition: String,
    output: String,
    time_now: String,
}

/// Rendering context for body
#[derive(Serialize)]
struct BodyContext {
    work_dir: String,
    module: Option<String>,
    host_diagnostic: String,
    gpu_diagnostic: String,
    invocations: Vec<String>,
    first_wait: u64,
    final_wait: u64,
}

/// Render a full batch script from a plan
pub fn render_script(plan: &LaunchPlan) -> Result<JobScript, RenderError> {
    let header = render_header(plan)?;
    let body = render_body(plan)?;
    Ok(JobScript { header, body })
}

impl JobScript {
    pub fn content(&self) -> String {
        format!("{}{}", self.header.content, self.body.content)
    }

    /// Write the job script to `job.sh` in the output directory, replacing any previous script
    pub fn write(&self, out_dir: &Path) -> std::io::Result<JobPath> {
        fs::create_dir_all(out_dir)?;
        let path = out_dir.join("job.sh");
        if path.exists() {
            warn!("Job script {} already exists and will be overwritten", path.display());
        }

        info!("Writing job script to {}", path.display());
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        // order is important when writing the file
        for content in [&self.header.content, &self.body.content] {
            file.write_all(content.as_bytes())?;
        }

        Ok(JobPath { path })
    }
}

fn template_engine<'a>(name: &'a str, template: &'a str) -> Result<TinyTemplate<'a>, RenderError> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template(name, template)?;
    Ok(tt)
}

/// Render the SBATCH header using TinyTemplate
fn render_header(plan: &LaunchPlan) -> Result<Header, RenderError> {
    /// included header template
    static HEADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/header.txt"));
    let tt = template_engine("header", HEADER)?;

    let resources = &plan.resources;
    let context = HeaderContext {
        job_name: resources.job_name.clone(),
        time: resources.time.clone(),
        nodes: resources.nodes,
        ntasks: resources.ntasks,
        mem: resources.mem.clone(),
        gpus: resources.gpus,
        gpu_class: resources.gpu_class.clone(),
        partition: resources.partition.clone(),
        output: resources.output.clone(),
        time_now: Utc::now().to_rfc3339(),
    };

    Ok(Header { content: tt.render("header", &context)? })
}

/// Render the job body using TinyTemplate
fn render_body(plan: &LaunchPlan) -> Result<Body, RenderError> {
    /// included body template
    static BODY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/body.txt"));
    let tt = template_engine("body", BODY)?;

    let invocations = plan.runs.iter()
        .map(|run| Invocation::for_run(plan, run).shell_line())
        .collect();

    let context = BodyContext {
        work_dir: shell_quote(&plan.environment.work_dir.to_string_lossy()),
        module: plan.environment.module.clone(),
        host_diagnostic: shell_join(&plan.diagnostics.host),
        gpu_diagnostic: shell_join(&plan.diagnostics.gpu),
        invocations,
        first_wait: plan.first_wait()?.as_secs(),
        final_wait: plan.final_wait()?.as_secs(),
    };

    Ok(Body { content: tt.render("body", &context)? })
}

fn shell_join(argv: &[String]) -> String {
    argv.iter().map(|arg| shell_quote(arg)).collect::<Vec<String>>().join(" ")
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::plan::read::default_plan;

    use super::*;

    #[test]
    fn header_carries_resource_request() {
        let script = render_script(&default_plan().unwrap()).unwrap().content();
        assert!(script.starts_with("#!/bin/bash\n"));
        for directive in [
            "#SBATCH --job-name=static-exp",
            "#SBATCH --time=48:00:00",
            "#SBATCH --nodes=1",
            "#SBATCH --ntasks=4",
            "#SBATCH --mem=16G",
            "#SBATCH --gres=gpu:1,VRAM:12GB",
            "#SBATCH --partition=normal",
            "#SBATCH --output=slurm-%j.out",
        ] {
            assert!(script.contains(directive), "missing {directive} in\n{script}");
        }
    }

    #[test]
    fn gpu_directive_dropped_without_gpus() {
        let mut plan = default_plan().unwrap();
        plan.resources.gpus = 0;
        let script = render_script(&plan).unwrap().content();
        assert!(!script.contains("--gres"));
        assert!(script.contains("#SBATCH --partition=normal"));
    }

    #[test]
    fn body_follows_batch_order() {
        let script = render_script(&default_plan().unwrap()).unwrap().content();
        let position = |needle: &str| script.find(needle).unwrap_or_else(|| panic!("missing {needle} in\n{script}"));

        let cd = position("cd /scratch/tsp-curriculum || exit 1");
        let module = position("module load singularity || exit 1");
        let host = position("\nhostname\n");
        let first_launch = position("--run-name static-exp-1 --curriculum 1 &");
        let first_sleep = position("sleep 10800");
        let final_sleep = position("sleep 172800");

        assert!(cd < module && module < host && host < first_launch);
        assert!(first_launch < first_sleep && first_sleep < final_sleep);
        assert_eq!(script.matches("nvidia-smi").count(), 2);
        assert!(script[first_sleep..final_sleep].contains("nvidia-smi"));
    }

    #[test]
    fn every_run_is_backgrounded() {
        let script = render_script(&default_plan().unwrap()).unwrap().content();
        for k in 1..=3 {
            let line = format!(
                "singularity run /scratch/containers/pytorch.sif --nv python3 src/main.py --mode all --run-name static-exp-{k} --curriculum {k} &"
            );
            assert!(script.contains(&line), "missing {line} in\n{script}");
        }
        assert_eq!(script.matches(" &\n").count(), 3);
    }

    #[test]
    fn write_replaces_existing_script() {
        let dir = tempdir().unwrap();
        let script = render_script(&default_plan().unwrap()).unwrap();
        fs::write(dir.path().join("job.sh"), "stale").unwrap();

        let job = script.write(dir.path()).unwrap();
        let written = fs::read_to_string(&job.path).unwrap();
        assert_eq!(written, script.content());
    }
}
