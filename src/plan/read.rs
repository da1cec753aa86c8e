use std::fmt;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde_json::Value;

use crate::plan::job::LaunchPlan;
use crate::plan::schema::load_schema;

/// included default plan, equivalent to the static-exp batch script
static DEFAULT_PLAN: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/plan/default.json"));

#[derive(Debug)]
pub enum PlanError {
    PlanReadError(String),
    JSONDecodeError(String),
    JSONValidationError(Vec<String>),
    DeserialisationError(String),
    Schema(String),
    Invalid(String),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlanError::PlanReadError(msg) => write!(f, "can't read plan: {msg}"),
            PlanError::JSONDecodeError(msg) => write!(f, "plan isn't valid JSON: {msg}"),
            PlanError::JSONValidationError(errors) => write!(f, "plan fails schema validation: {}", errors.join("; ")),
            PlanError::DeserialisationError(msg) => write!(f, "can't deserialise plan: {msg}"),
            PlanError::Schema(msg) => write!(f, "bundled plan schema is broken: {msg}"),
            PlanError::Invalid(msg) => write!(f, "invalid plan: {msg}"),
        }
    }
}

impl std::error::Error for PlanError {}

/// Read a plan file from disk
pub fn read_plan(path: &Path) -> Result<LaunchPlan, PlanError> {
    info!("Reading plan at {}", path.display());
    let json_string = fs::read_to_string(path).map_err(|err| {
        warn!("Can't read plan at path {}: {}", path.display(), err);
        PlanError::PlanReadError(format!("{}: {}", path.display(), err))
    })?;
    parse_plan(&json_string)
}

/// The built-in plan: three static-exp runs on curriculum stages 1, 2 and 3
pub fn default_plan() -> Result<LaunchPlan, PlanError> {
    info!("Using built-in plan");
    parse_plan(DEFAULT_PLAN)
}

/// Parse, validate and deserialise a JSON plan
pub fn parse_plan(json_string: &str) -> Result<LaunchPlan, PlanError> {
    info!("Parsing plan JSON into untyped structure");
    let json: Value = serde_json::from_str(json_string)
        .map_err(|err| PlanError::JSONDecodeError(err.to_string()))?;

    validate_schema(&json)?;
    info!("Plan is valid");

    info!("Deserialising valid JSON into typed plan");
    let plan = serde_json::from_value::<LaunchPlan>(json)
        .map_err(|err| PlanError::DeserialisationError(err.to_string()))?;
    plan.validate()?;
    Ok(plan)
}

fn validate_schema(json: &Value) -> Result<(), PlanError> {
    info!("Validating raw plan against JSON schema");
    let schema = load_schema()?;
    let result = schema.validate(json).map_err(|errors| {
        errors.map(|e| format!("{} at {}", e, e.instance_path)).collect::<Vec<String>>()
    });
    result.map_err(|errors| {
        warn!("Plan fails validation");
        PlanError::JSONValidationError(errors)
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn default_plan_matches_batch_script() {
        let plan = default_plan().unwrap();
        assert_eq!(plan.resources.time, "48:00:00");
        assert_eq!(plan.resources.nodes, 1);
        assert_eq!(plan.resources.ntasks, 4);
        assert_eq!(plan.resources.mem, "16G");
        assert_eq!(plan.resources.gpus, 1);
        assert_eq!(plan.resources.gpu_class, "12GB");
        assert_eq!(plan.resources.partition, "normal");
        assert_eq!(plan.schedule.first_wait, "03:00:00");
        assert_eq!(plan.schedule.final_wait, "48:00:00");
        assert_eq!(plan.program.script, "src/main.py");
        assert_eq!(plan.program.mode, "all");

        let runs: Vec<(&str, u32)> = plan.runs.iter().map(|r| (r.run_name.as_str(), r.curriculum)).collect();
        assert_eq!(runs, vec![("static-exp-1", 1), ("static-exp-2", 2), ("static-exp-3", 3)]);
    }

    #[test]
    fn optional_sections_take_defaults() {
        let json = r#"{
            "resources": {
                "time": "01:00:00", "nodes": 1, "ntasks": 1, "mem": "4G",
                "gpus": 0, "gpu_class": "any", "partition": "debug"
            },
            "environment": { "work_dir": "/tmp" },
            "container": { "image": "/tmp/image.sif" },
            "runs": [{ "run_name": "solo", "curriculum": 1 }],
            "schedule": { "first_wait": "00:10:00", "final_wait": "00:50:00" }
        }"#;
        let plan = parse_plan(json).unwrap();
        assert_eq!(plan.container.runtime, "singularity");
        assert!(plan.container.gpu);
        assert_eq!(plan.environment.module, None);
        assert_eq!(plan.program.interpreter, "python3");
        assert_eq!(plan.diagnostics.gpu, vec!["nvidia-smi".to_string()]);
        assert_eq!(plan.resources.job_name, "static-exp");
    }

    #[test]
    fn unknown_fields_fail_schema_validation() {
        let mut json: Value = serde_json::from_str(DEFAULT_PLAN).unwrap();
        json["resources"]["qos"] = Value::String("high".to_string());
        let err = parse_plan(&json.to_string()).unwrap_err();
        assert!(matches!(err, PlanError::JSONValidationError(_)));
    }

    #[test]
    fn broken_json_is_a_decode_error() {
        assert!(matches!(parse_plan("{ not json"), Err(PlanError::JSONDecodeError(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let missing = PathBuf::from("/definitely/not/here/plan.json");
        assert!(matches!(read_plan(&missing), Err(PlanError::PlanReadError(_))));
    }

    #[test]
    fn reads_plan_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, DEFAULT_PLAN).unwrap();
        assert_eq!(read_plan(&path).unwrap(), default_plan().unwrap());
    }
}
