//! Transport clients, one per upstream wire protocol

pub mod anthropic;
pub mod google;
mod upstream;
pub mod openai;
mod sse;

use std::sync::Arc;

use async_trait::async_trait;
use conduit_config::{LlmProviderConfig, ProviderId};
use url::Url;

use crate::error::ProviderError;
use crate::limits::ParameterLimits;
use crate::normalizer::StreamMeta;
use crate::types::{ChunkStream, CompletionRequest, CompletionResponse};

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use openai::OpenAiClient;

/// Features a client supports and how it estimates tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientCapabilities {
    pub streaming: bool,
    pub tool_calling: bool,
    /// Average characters per token
    pub token_width: f64,
}

/// Client for one upstream LLM API
#[async_trait]
pub trait TransportClient: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> ClientCapabilities;

    /// Accepted sampling parameter ranges
    fn limits(&self) -> ParameterLimits;

    /// Single round trip returning the full response
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Open a streaming completion
    ///
    /// The returned stream is single-pass. Dropping it closes the connection.
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError>;

    /// Cheap authenticated request proving the upstream is reachable
    async fn probe(&self) -> Result<(), ProviderError>;

    /// Reject out-of-range parameters before anything is sent
    fn validate(&self, request: &CompletionRequest) -> Result<(), ProviderError> {
        self.limits().check(request)
    }

    fn estimate_tokens(&self, text: &str) -> u32 {
        crate::tokens::estimate_tokens(text, self.capabilities().token_width)
    }
}

/// Build the transport client for `id` from its configuration
///
/// # Errors
///
/// Returns a `validation` error for an unusable base URL and an `auth` error
/// when a hosted provider has no API key
pub fn build_client(id: ProviderId, config: &LlmProviderConfig) -> Result<Arc<dyn TransportClient>, ProviderError> {
    if id != ProviderId::OpenAiLike && config.api_key.is_none() {
        return Err(ProviderError::auth(format!("provider '{id}' requires api_key")));
    }

    let client: Arc<dyn TransportClient> = match id {
        ProviderId::OpenAi | ProviderId::OpenAiLike => Arc::new(OpenAiClient::new(id, config)?),
        ProviderId::Anthropic => Arc::new(AnthropicClient::new(config)?),
        ProviderId::Google => Arc::new(GoogleClient::new(config)?),
    };

    Ok(client)
}

/// Configured base URL, falling back to the provider's public endpoint
fn base_url(id: ProviderId, config: &LlmProviderConfig) -> Result<Url, ProviderError> {
    if let Some(url) = &config.base_url {
        return Ok(url.clone());
    }

    let default = id
        .default_base_url()
        .ok_or_else(|| ProviderError::validation(format!("provider '{id}' requires base_url")))?;

    Url::parse(default).map_err(|e| ProviderError::validation(format!("invalid base_url for '{id}': {e}")))
}

/// Join `path` onto `base` without doubling slashes
fn endpoint(base: &Url, path: &str) -> String {
    format!("{}/{path}", base.as_str().trim_end_matches('/'))
}

fn stream_meta(request: &CompletionRequest, token_width: f64) -> StreamMeta {
    StreamMeta {
        model: request.model.clone(),
        prompt_tokens: crate::tokens::estimate_tokens(&request.prompt_text(), token_width),
        token_width,
    }
}
