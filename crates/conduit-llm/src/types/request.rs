use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use super::tool::{ToolChoice, ToolDefinition};

/// Sampling parameters controlling generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Maximum output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Provider-agnostic completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Target model; empty selects the provider's configured default
    #[serde(default)]
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub params: SamplingParams,
    /// Functions the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            params: SamplingParams::default(),
            tools: Vec::new(),
            tool_choice: None,
            stream: false,
        }
    }

    /// The system message, if one leads the conversation
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::System)
    }

    /// Concatenated text of every message, used for token estimates
    pub fn prompt_text(&self) -> String {
        let mut text = String::new();

        for message in &self.messages {
            text.push_str(&message.content);
            for call in &message.tool_calls {
                text.push_str(&call.function.name);
                text.push_str(&call.function.arguments);
            }
        }

        text
    }
}
