//! Google Generative Language (`Gemini`) client

use std::time::Duration;

use async_trait::async_trait;
use conduit_config::{LlmProviderConfig, ProviderId};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ClientCapabilities, TransportClient, sse, upstream};
use crate::convert::google::GoogleStreamState;
use crate::error::ProviderError;
use crate::limits::ParameterLimits;
use crate::normalizer::normalize;
use crate::protocol::google::{GoogleRequest, GoogleResponse};
use crate::tokens::DEFAULT_TOKEN_WIDTH;
use crate::types::{ChunkStream, CompletionRequest, CompletionResponse};

pub struct GoogleClient {
    http: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl GoogleClient {
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built
    pub fn new(config: &LlmProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: upstream::client(config.timeout)?,
            base_url: super::base_url(ProviderId::Google, config)?,
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    /// `models/{model}:{action}`, accepting models given with or without the prefix
    fn model_url(&self, model: &str, action: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        super::endpoint(&self.base_url, &format!("models/{model}:{action}"))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-goog-api-key", key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl TransportClient for GoogleClient {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            streaming: true,
            tool_calling: true,
            token_width: DEFAULT_TOKEN_WIDTH,
        }
    }

    fn limits(&self) -> ParameterLimits {
        ParameterLimits::GOOGLE
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let wire = GoogleRequest::from(request);

        let builder = self
            .http
            .post(self.model_url(&request.model, "generateContent"))
            .timeout(self.timeout)
            .json(&wire);

        let response = upstream::send(self.id(), self.authorize(builder)).await?;
        let wire: GoogleResponse = upstream::read_json(response).await?;

        let mut response = CompletionResponse::from(wire);
        if response.model.is_empty() {
            response.model.clone_from(&request.model);
        }

        Ok(response)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let wire = GoogleRequest::from(request);

        let builder = self
            .http
            .post(self.model_url(&request.model, "streamGenerateContent"))
            .query(&[("alt", "sse")])
            .json(&wire);

        let response = upstream::send(self.id(), self.authorize(builder)).await?;

        // No `[DONE]` marker; the stream ends at EOF after the finish reason
        let mut state = GoogleStreamState::new();
        let events = sse::events(self.id(), response, move |data| {
            sse::decode::<GoogleResponse>(data)
                .map(|chunk| state.convert_chunk(chunk).into_iter().map(Ok).collect::<Vec<_>>())
                .unwrap_or_default()
        });

        Ok(normalize(events, super::stream_meta(request, DEFAULT_TOKEN_WIDTH)))
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
