use serde::{Deserialize, Serialize};
use strum::Display;

/// Tool advertised by a provider
///
/// Names are unique across every registered provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Definition whose parameter schema is derived from `T`
    pub fn from_schema<T: schemars::JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut parameters = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();

        if let Some(object) = parameters.as_object_mut() {
            object.remove("$schema");
            object.remove("title");
        }

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One part of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
    Json { data: serde_json::Value },
}

/// Outcome of exactly one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub call_id: String,
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolResult {
    pub fn new(call_id: impl Into<String>, content: Vec<ToolContent>) -> Self {
        Self {
            call_id: call_id.into(),
            content,
            is_error: false,
        }
    }

    pub fn text(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(call_id, vec![ToolContent::Text { text: text.into() }])
    }

    /// Failed call; the message is what the model gets to see
    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(call_id, message)
        }
    }

    /// Parts flattened into the text of a tool message
    pub fn to_message_content(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ToolContent::Text { text } => text.clone(),
                ToolContent::Json { data } => data.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Addressable read-only resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// e.g. `search://history`
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

/// Connection state of a tool provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderState {
    Connected,
    Disconnected,
    Error,
}

/// Liveness of a provider at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
