use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::message::Role;
use super::response::{FinishReason, Usage};
use crate::error::ProviderError;

/// Normalized, single-pass stream of completion chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, ProviderError>> + Send>>;

/// Raw events decoded from a provider's SSE stream
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send>>;

/// Event decoded from one upstream SSE message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Model name announced by the upstream
    Model(String),
    Text(String),
    ToolCall(ToolCallDelta),
    Finish(FinishReason),
    Usage(Usage),
    /// Upstream end-of-stream marker
    Done,
}

/// Incremental unit of a streaming response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Shared by every chunk of one stream
    pub id: String,
    /// Always `"chat.completion.chunk"`
    pub object: String,
    pub created: u64,
    pub model: String,
    pub delta: ChunkDelta,
    /// Set on exactly one chunk, the last
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    pub const fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Content carried by one chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// Fragment of a streamed tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call within the response
    pub index: u32,
    /// Present on the first fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Partial JSON arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
