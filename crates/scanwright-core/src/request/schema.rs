//! JSON Schema validation for scan requests.

use std::sync::OnceLock;

/// Embedded request schema (loaded at compile time).
const REQUEST_SCHEMA_JSON: &str = include_str!("../../../../schema/scan_request.schema.json");

/// Compiled validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(REQUEST_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a request value against the schema.
///
/// Returns every violation, each suffixed with its instance path.
pub fn validate_request_schema(request: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(request)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{} at {}", e, path)
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Shape check without error details.
pub fn is_valid_request(request: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(request))
        .unwrap_or(false)
}
