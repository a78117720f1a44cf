use serde::{Deserialize, Serialize};

use super::message::{Role, ToolCall};

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    /// Hit the output token limit
    Length,
    /// Model handed control to a tool
    ToolCalls,
    ContentFilter,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Counts are a character-based approximation, not upstream figures
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
}

impl Usage {
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            estimated: false,
        }
    }

    pub const fn estimate(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            estimated: true,
            ..Self::new(prompt_tokens, completion_tokens)
        }
    }
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: Option<FinishReason>,
}

/// Assistant message within a response choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChoiceMessage {
    /// Build from collected text and tool calls, dropping empty text when tools were called
    pub fn assistant(text: String, tool_calls: Vec<ToolCall>) -> Self {
        let content = if text.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(text)
        };

        Self {
            role: Role::Assistant,
            content,
            tool_calls,
        }
    }
}

/// Provider-agnostic completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    /// Always `"chat.completion"`
    pub object: String,
    /// Unix timestamp of creation
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    pub fn new(id: String, model: String, choices: Vec<Choice>, usage: Option<Usage>) -> Self {
        Self {
            id,
            object: "chat.completion".to_owned(),
            created: super::unix_now(),
            model,
            choices,
            usage,
        }
    }

    /// Tool calls requested by the first choice
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.choices.first().map_or(&[], |c| c.message.tool_calls.as_slice())
    }

    /// Text of the first choice
    pub fn text(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.content.as_deref())
    }

    /// Text of every choice, used for token estimates
    pub(crate) fn completion_text(&self) -> String {
        let mut text = String::new();

        for choice in &self.choices {
            if let Some(content) = &choice.message.content {
                text.push_str(content);
            }
            for call in &choice.message.tool_calls {
                text.push_str(&call.function.name);
                text.push_str(&call.function.arguments);
            }
        }

        text
    }
}
