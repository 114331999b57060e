//! Structured-output validation against caller-supplied JSON Schemas.

use crate::api::Response;
use crate::error::{DispatchError, Result};
use serde_json::Value;

/// Validate a response against a caller-supplied JSON Schema.
///
/// The instance is the response `content` parsed as JSON when it parses, and
/// the opaque `raw` payload otherwise. The first violation surfaces as
/// [`DispatchError::SchemaValidation`]; a malformed schema does too, since the
/// caller supplied it.
pub fn validate_response(response: &Response, schema: &Value) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| DispatchError::SchemaValidation(format!("Invalid response schema: {}", e)))?;

    let instance = response
        .content
        .as_deref()
        .and_then(|content| serde_json::from_str::<Value>(content).ok())
        .unwrap_or_else(|| response.raw.clone());

    validator.validate(&instance).map_err(|error| {
        DispatchError::SchemaValidation(format!("{} at {}", error, error.instance_path()))
    })
}
