//! Provider-agnostic request, response and stream types
//!
//! Every wire protocol converts to and from these shapes. They also serve as
//! the JSON body of the gateway's HTTP surface.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{FunctionCall, Message, Role, ToolCall};
pub use request::{CompletionRequest, SamplingParams};
pub use response::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage};
pub use stream::{ChunkDelta, ChunkStream, CompletionChunk, EventStream, StreamEvent, ToolCallDelta};
pub use tool::{
    FunctionDefinition, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition,
};

/// Seconds since the Unix epoch
pub(crate) fn unix_now() -> u64 {
    u64::try_from(jiff::Timestamp::now().as_second()).unwrap_or_default()
}
