//! Upstream LLM access for conduit
//!
//! Provider-agnostic request and response types, the `OpenAI`, Anthropic and
//! Google wire protocols, transport clients for each, bounded retries, and
//! the [`ProviderRegistry`] that ties them together.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod convert;
pub mod defaults;
pub mod error;
pub mod limits;
pub mod normalizer;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod tokens;
pub mod transport;
pub mod types;

pub use conduit_config::{ProviderId, ProviderSelection};
pub use defaults::RequestDefaults;
pub use error::{ErrorKind, ProviderError};
pub use limits::ParameterLimits;
pub use registry::{HealthState, ProviderHealth, ProviderRegistry, TaskKind};
pub use retry::{RetryPolicy, with_retry};
pub use tokens::estimate_tokens;
pub use transport::{ClientCapabilities, TransportClient, build_client};
pub use types::{
    ChunkStream, CompletionChunk, CompletionRequest, CompletionResponse, FinishReason, Message, Role, ToolCall,
    ToolDefinition, Usage,
};
