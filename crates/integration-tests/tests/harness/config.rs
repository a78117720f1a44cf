//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::time::Duration;

use conduit_config::{
    Config, LlmProviderConfig, ProviderId, ProviderSelection, SearchProviderConfig, ToolProviderConfig,
    ToolProviderKind,
};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Minimal config with fast retries
    pub fn new() -> Self {
        let mut config = Config::default();
        config.server.listen_address = Some(SocketAddr::from(([127, 0, 0, 1], 0)));
        config.llm.retry.base_delay = Duration::from_millis(10);
        config.llm.retry.max_delay = Duration::from_millis(200);

        Self { config }
    }

    /// Add an `openai-like` provider pointed at a mock backend and make it the default
    pub fn with_openai_like(mut self, base_url: &str) -> Self {
        self.config.llm.providers.insert(
            ProviderId::OpenAiLike,
            LlmProviderConfig {
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
                default_model: Some("mock-model-1".to_owned()),
                timeout: Duration::from_secs(5),
                ..LlmProviderConfig::default()
            },
        );
        self.config.llm.default_provider = ProviderSelection::Selected(ProviderId::OpenAiLike);
        self
    }

    /// Keep providers but leave the default unselected
    pub fn without_default_provider(mut self) -> Self {
        self.config.llm.default_provider = ProviderSelection::Unselected;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.config.llm.retry.max_attempts = max_attempts;
        self.config.llm.retry.base_delay = base_delay;
        self
    }

    /// Add a search tool provider under `id`
    pub fn with_search_provider(mut self, id: &str, endpoint: &str) -> Self {
        self.config
            .tools
            .providers
            .insert(id.to_owned(), search_provider(endpoint));
        self
    }

    pub fn with_max_continuations(mut self, max: u32) -> Self {
        self.config.tools.max_continuations = max;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Enabled, auto-injected search provider config
pub fn search_provider(endpoint: &str) -> ToolProviderConfig {
    ToolProviderConfig {
        enabled: true,
        auto_inject: true,
        kind: ToolProviderKind::Search(SearchProviderConfig {
            endpoint: endpoint.parse().expect("valid URL"),
            api_key: SecretString::from("tvly-test"),
            max_results: 5,
            timeout: Duration::from_secs(5),
            history_capacity: 50,
        }),
    }
}
