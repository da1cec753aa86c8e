//! Launch plans describe one batch job: what to request from the scheduler and what to run
//!
//! Plans are JSON documents. They're validated against a bundled JSON schema before being
//! deserialised, then checked for the constraints a schema can't express (unique run names).

/// Typed launch plan
pub mod job;
/// Read, validate and deserialise plan files
pub mod read;
/// Bundled JSON schema
pub mod schema;
/// SLURM style wall time strings
pub mod walltime;
/// Constraints beyond the schema
pub mod validate;
