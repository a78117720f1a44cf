//! Conversions between canonical types and each wire format

pub mod anthropic;
pub mod google;
pub mod openai;

/// Parse model-supplied JSON arguments, treating blank input as an empty object
pub(crate) fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::json!({});
    }

    serde_json::from_str(arguments).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "forwarding unparseable tool arguments as a string");
        serde_json::Value::String(arguments.to_owned())
    })
}

/// Serialize tool input back to the canonical JSON string form
pub(crate) fn encode_arguments(input: &serde_json::Value) -> String {
    match input {
        serde_json::Value::Null => "{}".to_owned(),
        other => other.to_string(),
    }
}
