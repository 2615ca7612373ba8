//! JSON Schema validation for tool arguments and structured output.

use serde_json::Value;

use crate::error::UppError;

/// Validate `instance` against `schema`, collecting up to three error
/// messages. Non-object schemas are treated as unconstrained.
pub(crate) fn validate_schema(schema: &Value, instance: &Value) -> Result<(), String> {
    if !schema.is_object() {
        return Ok(());
    }

    let compiled = match jsonschema::validator_for(schema) {
        Ok(compiled) => compiled,
        Err(e) => {
            // A malformed schema is a caller bug, not a reason to block
            // the tool round.
            tracing::warn!(error = %e, "invalid JSON schema, skipping validation");
            return Ok(());
        }
    };

    if compiled.validate(instance).is_err() {
        let mut msgs = Vec::new();
        for err in compiled.iter_errors(instance) {
            msgs.push(format!("{} at {}", err, err.instance_path));
            if msgs.len() >= 3 {
                break;
            }
        }
        return Err(msgs.join("; "));
    }

    Ok(())
}

/// Validate the final answer against the requested output schema.
///
/// `text` is the raw payload assembled from the final message. Parse
/// failures and schema violations are both fatal for the turn.
pub(crate) fn finalize_structured_output(
    schema: Option<&Value>,
    text: &str,
) -> Result<Option<Value>, UppError> {
    let Some(schema) = schema else {
        return Ok(None);
    };

    let parsed: Value = serde_json::from_str(text).map_err(|e| {
        UppError::invalid_request(format!("structured output is not valid JSON: {e}"))
    })?;

    validate_schema(schema, &parsed).map_err(|msg| {
        tracing::warn!(error = %msg, "structured output failed schema validation");
        UppError::invalid_request(format!("structured output failed validation: {msg}"))
    })?;

    Ok(Some(parsed))
}
