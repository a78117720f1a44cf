//! `OpenAI` chat completions client, also used for compatible servers

use std::time::Duration;

use async_trait::async_trait;
use conduit_config::{LlmProviderConfig, ProviderId};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ClientCapabilities, TransportClient, sse, upstream};
use crate::convert::openai::chunk_events;
use crate::error::ProviderError;
use crate::limits::ParameterLimits;
use crate::normalizer::normalize;
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse, OpenAiStreamChunk};
use crate::tokens::DEFAULT_TOKEN_WIDTH;
use crate::types::{ChunkStream, CompletionRequest, CompletionResponse};

/// Client for `OpenAI` and any server speaking its chat completions protocol
pub struct OpenAiClient {
    id: ProviderId,
    http: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl OpenAiClient {
    /// Create a client registered under `id`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or the HTTP client cannot be built
    pub fn new(id: ProviderId, config: &LlmProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            id,
            http: upstream::client(config.timeout)?,
            base_url: super::base_url(id, config)?,
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    /// Only the hosted API accepts `stream_options`; many compatible servers reject it
    fn is_canonical(&self) -> bool {
        self.base_url.host_str() == Some("api.openai.com")
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl TransportClient for OpenAiClient {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            streaming: true,
            tool_calling: true,
            token_width: DEFAULT_TOKEN_WIDTH,
        }
    }

    fn limits(&self) -> ParameterLimits {
        ParameterLimits::OPENAI
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let wire = OpenAiRequest::from(request);

        let builder = self
            .http
            .post(super::endpoint(&self.base_url, "chat/completions"))
            .timeout(self.timeout)
            .json(&wire);

        let response = upstream::send(self.id, self.authorize(builder)).await?;
        let wire: OpenAiResponse = upstream::read_json(response).await?;

        Ok(wire.into())
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let wire = OpenAiRequest::from(request).streaming(self.is_canonical());

        let builder = self
            .http
            .post(super::endpoint(&self.base_url, "chat/completions"))
            .json(&wire);

        let response = upstream::send(self.id, self.authorize(builder)).await?;

        let events = sse::events(self.id, response, |data| {
            sse::decode::<OpenAiStreamChunk>(data)
                .map(|chunk| chunk_events(chunk).into_iter().map(Ok).collect())
                .unwrap_or_default()
        });

        Ok(normalize(events, super::stream_meta(request, DEFAULT_TOKEN_WIDTH)))
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        let builder = self
            .http
            .get(super::endpoint(&self.base_url, "models"))
            .timeout(self.timeout);

        upstream::send(self.id, self.authorize(builder)).await?;
        Ok(())
    }
}
