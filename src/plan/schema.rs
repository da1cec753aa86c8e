use jsonschema::JSONSchema;
use log::info;
use serde_json::Value;

use crate::plan::read::PlanError;

/// included plan schema
static PLAN_SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/plan.json"));

/// Compile the bundled plan schema
///
/// The schema only uses internal references (`#/definitions/...`) so no resolver is needed.
pub fn load_schema() -> Result<JSONSchema, PlanError> {
    info!("Compiling bundled plan schema");
    let schema: Value = serde_json::from_str(PLAN_SCHEMA)
        .map_err(|err| PlanError::Schema(err.to_string()))?;
    JSONSchema::compile(&schema).map_err(|err| PlanError::Schema(err.to_string()))
}
