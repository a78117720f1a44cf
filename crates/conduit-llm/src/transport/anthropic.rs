//! Anthropic Messages API client

use std::time::Duration;

use async_trait::async_trait;
use conduit_config::{LlmProviderConfig, ProviderId};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ClientCapabilities, TransportClient, sse, upstream};
use crate::convert::anthropic::AnthropicStreamState;
use crate::error::ProviderError;
use crate::limits::ParameterLimits;
use crate::normalizer::normalize;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::types::{ChunkStream, CompletionRequest, CompletionResponse};

const API_VERSION: &str = "2023-06-01";

/// Claude tokenizers average slightly fewer characters per token
const TOKEN_WIDTH: f64 = 3.5;

pub struct AnthropicClient {
    http: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl AnthropicClient {
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built
    pub fn new(config: &LlmProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: upstream::client(config.timeout)?,
            base_url: super::base_url(ProviderId::Anthropic, config)?,
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("anthropic-version", API_VERSION);

        match &self.api_key {
            Some(key) => builder.header("x-api-key", key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl TransportClient for AnthropicClient {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            streaming: true,
            tool_calling: true,
            token_width: TOKEN_WIDTH,
        }
    }

    fn limits(&self) -> ParameterLimits {
        ParameterLimits::ANTHROPIC
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let wire = AnthropicRequest::from(request);

        let builder = self
            .http
            .post(super::endpoint(&self.base_url, "messages"))
            .timeout(self.timeout)
            .json(&wire);

        let response = upstream::send(self.id(), self.authorize(builder)).await?;
        let wire: AnthropicResponse = upstream::read_json(response).await?;

        Ok(wire.into())
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let mut wire = AnthropicRequest::from(request);
        wire.stream = Some(true);

        let builder = self.http.post(super::endpoint(&self.base_url, "messages")).json(&wire);
        let response = upstream::send(self.id(), self.authorize(builder)).await?;

        let mut state = AnthropicStreamState::new();
        let events = sse::events(self.id(), response, move |data| {
            sse::decode::<AnthropicStreamEvent>(data)
                .map(|event| state.convert_event(event))
                .unwrap_or_default()
        });

        Ok(normalize(events, super::stream_meta(request, TOKEN_WIDTH)))
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        let builder = self
            .http
            .get(super::endpoint(&self.base_url, "models"))
            .timeout(self.timeout);

        upstream::send(self.id(), self.authorize(builder)).await?;
        Ok(())
    }
}
