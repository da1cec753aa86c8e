use crate::plan::job::{LaunchPlan, RunSpec};

/// A container command line for one run
///
/// `<runtime> run <image> [--nv] <interpreter> <script> --mode <mode> --run-name <name> --curriculum <stage>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub run_name: String,
    pub curriculum: u32,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn for_run(plan: &LaunchPlan, run: &RunSpec) -> Invocation {
        let container = &plan.container;
        let program = &plan.program;

        let mut args = vec!["run".to_string(), container.image.to_string_lossy().to_string()];
        if container.gpu {
            args.push("--nv".to_string());
        }
        args.extend([
            program.interpreter.clone(),
            program.script.clone(),
            "--mode".to_string(),
            program.mode.clone(),
            "--run-name".to_string(),
            run.run_name.clone(),
            "--curriculum".to_string(),
            run.curriculum.to_string(),
        ]);

        Invocation {
            run_name: run.run_name.clone(),
            curriculum: run.curriculum,
            program: container.runtime.clone(),
            args,
        }
    }

    /// The invocation as it would be typed into a shell
    pub fn shell_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|arg| shell_quote(arg))
            .collect::<Vec<String>>()
            .join(" ")
    }
}

/// Single-quote a word for POSIX shells unless it's made only of safe characters
pub fn shell_quote(word: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-./:=%+,@".contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use crate::plan::read::default_plan;

    use super::*;

    #[test]
    fn default_runs_share_everything_but_name_and_stage() {
        let plan = default_plan().unwrap();
        let invocations: Vec<Invocation> = plan.runs.iter().map(|run| Invocation::for_run(&plan, run)).collect();

        for (k, invocation) in (1..=3).zip(&invocations) {
            assert_eq!(invocation.program, "singularity");
            let expected = format!(
                "run /scratch/containers/pytorch.sif --nv python3 src/main.py --mode all --run-name static-exp-{k} --curriculum {k}"
            );
            assert_eq!(invocation.args.join(" "), expected);
            assert_eq!(invocation.curriculum, k);
        }
    }

    #[test]
    fn gpu_passthrough_is_optional() {
        let mut plan = default_plan().unwrap();
        plan.container.gpu = false;
        let invocation = Invocation::for_run(&plan, &plan.runs[0]);
        assert!(!invocation.args.contains(&"--nv".to_string()));
    }

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(shell_quote("static-exp-1"), "static-exp-1");
        assert_eq!(shell_quote("/scratch/my images/a.sif"), "'/scratch/my images/a.sif'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
