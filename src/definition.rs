use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::CaseError;
use crate::types::TestDefinition;

pub const DEFINITION_FILE: &str = "test.json";

/// List-valued keys every definition must carry, in the order they are checked.
const LIST_FIELDS: [&str; 4] = ["includedirs", "linkdirs", "links", "defines"];

pub fn definition_path(case_dir: &Path) -> PathBuf {
    case_dir.join(DEFINITION_FILE)
}

/// Locate, parse, and validate the definition for the test in `case_dir`.
///
/// A missing file, a syntax error, and a schema violation are reported as
/// distinct `CaseError` variants.
pub fn load_definition(case_dir: &Path) -> Result<TestDefinition, CaseError> {
    let path = definition_path(case_dir);

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CaseError::DefinitionMissing(path))
        }
        Err(e) => return Err(CaseError::io(&path, e)),
    };

    parse_definition(&contents, &path)
}

/// Parse definition text. `path` is only used for error messages.
pub fn parse_definition(contents: &str, path: &Path) -> Result<TestDefinition, CaseError> {
    let value: Value =
        serde_json::from_str(contents).map_err(|e| CaseError::DefinitionSyntax {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    validate_schema(&value)?;

    serde_json::from_value(value).map_err(|e| {
        CaseError::Internal(format!(
            "validated definition {} failed to deserialize: {}",
            path.display(),
            e
        ))
    })
}

/// Check `value` against the definition schema: `name` is a string and each
/// of the list fields is an array of strings. Reports the first offending key.
pub fn validate_schema(value: &Value) -> Result<(), CaseError> {
    let object = value.as_object().ok_or_else(|| CaseError::DefinitionInvalid {
        field: "<root>".to_string(),
        reason: "expected a JSON object".to_string(),
    })?;

    match object.get("name") {
        None | Some(Value::Null) => return Err(missing("name")),
        Some(Value::String(_)) => {}
        Some(_) => return Err(mistyped("name", "expected a string")),
    }

    for field in LIST_FIELDS {
        match object.get(field) {
            None | Some(Value::Null) => return Err(missing(field)),
            Some(Value::Array(entries)) => {
                if !entries.iter().all(Value::is_string) {
                    return Err(mistyped(field, "expected a list of strings"));
                }
            }
            Some(_) => return Err(mistyped(field, "expected a list")),
        }
    }

    Ok(())
}

fn missing(field: &str) -> CaseError {
    CaseError::DefinitionInvalid {
        field: field.to_string(),
        reason: "missing".to_string(),
    }
}

fn mistyped(field: &str, reason: &str) -> CaseError {
    CaseError::DefinitionInvalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
