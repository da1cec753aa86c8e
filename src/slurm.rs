//! Render a launch plan as a SLURM batch script and submit it

/// Render the SBATCH header and job body with TinyTemplate
pub mod script;
/// Submit rendered job scripts with sbatch
pub mod submit;
