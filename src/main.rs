use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use tsp_launcher::db::open::open_db;
use tsp_launcher::db::run::load::load_runs;
use tsp_launcher::launch::invocation::Invocation;
use tsp_launcher::launch::launch_plan;
use tsp_launcher::launch::supervisor::{batch_id, shutdown_signal, WaitSchedule};
use tsp_launcher::plan::job::LaunchPlan;
use tsp_launcher::plan::read::{default_plan, read_plan};
use tsp_launcher::policy::WaitPolicy;
use tsp_launcher::slurm::script::render_script;
use tsp_launcher::slurm::submit::{sbatch_command, submit};
use tsp_launcher::WorkingDirectory;

/// Launch curriculum training runs on a SLURM GPU node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON launch plan, the built-in static-exp plan is used if not set
    #[arg(short, long, global = true)]
    plan: Option<PathBuf>,

    /// Override the plan's working directory
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the batch script (job.sh) without submitting it
    Render {
        /// Directory to write job.sh to
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Render the batch script and submit it with sbatch
    Submit {
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long, default_value = "sbatch")]
        sbatch: PathBuf,
        /// Render only, don't run sbatch
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the batch directly on this node
    Launch {
        #[arg(long, value_enum, default_value_t = WaitPolicy::Fixed)]
        wait: WaitPolicy,
        /// Check the environment and print the runs without starting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print recorded runs
    Status {
        /// Only show one batch (a SLURM job id or local-... timestamp)
        #[arg(long)]
        batch: Option<String>,
    },
    /// Print the effective plan as JSON
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("tsp-launcher starting up");

    let args = Args::parse();
    let plan = load_plan(&args)?;

    match args.command {
        Commands::Render { out } => {
            let script = render_script(&plan)?;
            let job = script.write(&out).with_context(|| format!("writing job script to {}", out.display()))?;
            println!("{}", job.path.display());
        }
        Commands::Submit { out, sbatch, dry_run } => {
            let script = render_script(&plan)?;
            let job = script.write(&out).with_context(|| format!("writing job script to {}", out.display()))?;
            if dry_run {
                info!("--dry-run set, not running {:?}", sbatch_command(&job, &sbatch));
            } else {
                let job_id = submit(&job, &sbatch)?;
                println!("{job_id}");
            }
        }
        Commands::Launch { wait, dry_run } => launch(plan, wait, dry_run).await?,
        Commands::Status { batch } => {
            let wd = WorkingDirectory { path: plan.environment.work_dir.clone() };
            let conn = open_db(&wd).context("opening run ledger")?;
            for record in load_runs(&conn, batch.as_deref())? {
                println!("{record}");
            }
        }
        Commands::Plan => println!("{}", serde_json::to_string_pretty(&plan)?),
    }

    Ok(())
}

fn load_plan(args: &Args) -> Result<LaunchPlan> {
    let mut plan = match &args.plan {
        Some(path) => read_plan(path)?,
        None => default_plan()?,
    };
    if let Some(work_dir) = &args.work_dir {
        info!("Overriding working directory with {}", work_dir.display());
        plan.environment.work_dir = work_dir.clone();
        plan.validate()?;
    }
    Ok(plan)
}

async fn launch(plan: LaunchPlan, wait: WaitPolicy, dry_run: bool) -> Result<()> {
    let schedule = WaitSchedule::from_plan(&plan)?;

    if dry_run {
        tsp_launcher::launch::environment::prepare(&plan).await?;
        info!("--dry-run set, not launching");
        for run in &plan.runs {
            println!("{}", Invocation::for_run(&plan, run).shell_line());
        }
        return Ok(());
    }

    let report = launch_plan(plan, schedule, wait, batch_id(), shutdown_signal()).await?;
    if !report.is_success() {
        let failed = report.failed();
        bail!("{} of {} runs failed: {}", failed.len(), report.runs.len(),
            failed.iter().map(|run| run.run_name.as_str()).collect::<Vec<&str>>().join(", "));
    }
    Ok(())
}
