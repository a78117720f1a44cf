//! Entry point tying the provider and tool registries together

use std::sync::Arc;

use conduit_config::{Config, ToolProviderConfig, ToolsConfig};
use conduit_llm::{
    ChunkStream, CompletionRequest, CompletionResponse, ProviderError, ProviderHealth, ProviderId, ProviderRegistry,
};
use conduit_tools::{
    HealthReport, RegistrationOptions, ToolDefinition, ToolError, ToolFilter, ToolProvider, ToolRegistry, build_provider,
};
use indexmap::IndexMap;

use crate::history::{HistoryEntry, HistoryStore};
use crate::injection::{AutoInjectionManager, InjectionSettings, ToolOptions};

/// Completion and tool-provider operations behind one handle
///
/// Built once at startup and shared by reference; nothing here is global.
pub struct Gateway {
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    history: Arc<HistoryStore>,
    injection: AutoInjectionManager,
}

impl Gateway {
    pub fn new(providers: Arc<ProviderRegistry>, tools: Arc<ToolRegistry>, config: &ToolsConfig) -> Self {
        let history = Arc::new(HistoryStore::new(config.history_capacity, config.history_conversations));
        let injection = AutoInjectionManager::new(
            Arc::clone(&providers),
            Arc::clone(&tools),
            Arc::clone(&history),
            InjectionSettings::from(config),
        );

        Self {
            providers,
            tools,
            history,
            injection,
        }
    }

    /// Build every configured LLM and tool provider
    ///
    /// Tool providers that fail to initialize are skipped with a warning so
    /// one unreachable service does not keep the gateway down.
    ///
    /// # Errors
    ///
    /// Returns an error if an LLM provider cannot be built
    pub async fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let providers = ProviderRegistry::from_config(&config.llm)?;
        let gateway = Self::new(Arc::new(providers), Arc::new(ToolRegistry::new()), &config.tools);

        for (id, provider) in &config.tools.providers {
            if let Err(e) = gateway.register_tool_provider(id, provider).await {
                tracing::warn!(provider = %id, error = %e, "failed to register tool provider, skipping");
            }
        }

        tracing::info!(
            llm_providers = gateway.providers.providers().len(),
            tool_providers = gateway.tools.records().await.len(),
            "gateway ready"
        );

        Ok(gateway)
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Complete on `provider`, or the configured default when `None`
    ///
    /// # Errors
    ///
    /// Returns `validation` when no provider is named and no default is
    /// configured, otherwise whatever the provider registry returns
    pub async fn complete(
        &self,
        provider: Option<ProviderId>,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let id = self.providers.resolve(provider)?;
        self.providers.complete(id, request).await
    }

    /// Stream from `provider`, or the configured default when `None`
    ///
    /// # Errors
    ///
    /// Same as [`Gateway::complete`]
    pub async fn stream(&self, provider: Option<ProviderId>, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let id = self.providers.resolve(provider)?;
        self.providers.stream(id, request).await
    }

    /// Complete with tool injection and execution
    ///
    /// # Errors
    ///
    /// See [`AutoInjectionManager::complete_with_tools`]
    pub async fn complete_with_tools(
        &self,
        provider: Option<ProviderId>,
        request: CompletionRequest,
        options: &ToolOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let id = self.providers.resolve(provider)?;
        self.injection.complete_with_tools(id, request, options).await
    }

    /// Build, initialize and register the tool provider described by `config`
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, an unreachable service, a taken id or
    /// a tool name another provider already publishes
    pub async fn register_tool_provider(&self, id: &str, config: &ToolProviderConfig) -> Result<(), ToolError> {
        let provider = build_provider(id, config)?;
        let options = RegistrationOptions {
            enabled: config.enabled,
            auto_inject: config.auto_inject,
        };

        self.register_tool_handle(id, provider, options).await
    }

    /// Initialize and register an already constructed provider
    ///
    /// A provider rejected by the registry is disconnected again.
    ///
    /// # Errors
    ///
    /// Same as [`Gateway::register_tool_provider`], minus configuration
    pub async fn register_tool_handle(
        &self,
        id: &str,
        provider: Arc<dyn ToolProvider>,
        options: RegistrationOptions,
    ) -> Result<(), ToolError> {
        provider.initialize().await?;

        if let Err(e) = self.tools.register_provider(id, Arc::clone(&provider), options).await {
            provider.disconnect().await;
            return Err(e);
        }

        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ToolError::ProviderNotFound`] for an unknown id
    pub async fn unregister_tool_provider(&self, id: &str) -> Result<(), ToolError> {
        self.tools.unregister_provider(id).await
    }

    pub async fn health_check_all(&self) -> IndexMap<String, HealthReport> {
        self.tools.health_check_all().await
    }

    /// Tool-call history of `conversation`, oldest first
    pub fn history(&self, conversation: &str) -> Vec<HistoryEntry> {
        self.history.get(conversation)
    }

    /// Forget the tool-call history of `conversation`; `false` if it had none
    pub fn clear_history(&self, conversation: &str) -> bool {
        self.history.clear(conversation)
    }

    /// Tools of every enabled, connected provider
    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        let filter = ToolFilter {
            enabled_only: true,
            ..ToolFilter::default()
        };

        self.tools.list_tools(&filter).await
    }

    /// Probe `provider` and return its refreshed health
    ///
    /// # Errors
    ///
    /// Returns `not_found` when the provider is not registered
    pub async fn provider_health(&self, provider: ProviderId) -> Result<ProviderHealth, ProviderError> {
        if !self.providers.is_registered(provider) {
            return Err(ProviderError::not_found(format!("provider not registered: {provider}")));
        }

        self.providers.health_check(provider).await;

        self.providers
            .health(provider)
            .ok_or_else(|| ProviderError::not_found(format!("provider not registered: {provider}")))
    }
}
