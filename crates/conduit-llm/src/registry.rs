//! Provider registry dispatching requests to transport clients

use std::sync::Arc;
use std::time::{Duration, Instant};

use conduit_config::{LlmConfig, LlmProviderConfig, ProviderId, ProviderSelection};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ProviderError;
use crate::defaults::RequestDefaults;
use crate::retry::RetryPolicy;
use crate::tokens::ensure_usage;
use crate::transport::{TransportClient, build_client};
use crate::types::{ChunkStream, CompletionRequest, CompletionResponse};

/// Result of the most recent probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthState {
    /// Never probed since registration
    Unknown,
    Healthy,
    Unhealthy,
}

/// Cached health of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub state: HealthState,
    pub last_checked: Option<jiff::Timestamp>,
    pub latency_ms: Option<u64>,
}

impl ProviderHealth {
    const fn unknown() -> Self {
        Self {
            state: HealthState::Unknown,
            last_checked: None,
            latency_ms: None,
        }
    }
}

/// Kind of work a caller wants a provider for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    /// Long documents and research; favors large context windows
    Analysis,
    Coding,
    Creative,
    General,
}

impl TaskKind {
    /// Static preference order, best first
    pub const fn preference(self) -> [ProviderId; 4] {
        use ProviderId::{Anthropic, Google, OpenAi, OpenAiLike};

        match self {
            Self::Analysis => [Google, Anthropic, OpenAi, OpenAiLike],
            Self::Coding => [Anthropic, OpenAi, Google, OpenAiLike],
            Self::Creative | Self::General => [OpenAi, Anthropic, Google, OpenAiLike],
        }
    }
}

#[derive(Clone)]
struct Entry {
    client: Arc<dyn TransportClient>,
    defaults: Arc<RequestDefaults>,
}

/// Registered transport clients keyed by provider
///
/// Lookups clone the entry out of the map so no lock is held across an
/// upstream call.
pub struct ProviderRegistry {
    entries: DashMap<ProviderId, Entry>,
    health: DashMap<ProviderId, ProviderHealth>,
    retry: RetryPolicy,
    default: ProviderSelection,
}

impl ProviderRegistry {
    pub fn new(retry: RetryPolicy, default: ProviderSelection) -> Self {
        Self {
            entries: DashMap::new(),
            health: DashMap::new(),
            retry,
            default,
        }
    }

    /// Build a registry holding every configured provider
    ///
    /// # Errors
    ///
    /// Returns the first provider that fails to build
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let registry = Self::new(RetryPolicy::from(&config.retry), config.default_provider);

        for (id, provider) in &config.providers {
            registry.register(*id, provider)?;
        }

        Ok(registry)
    }

    /// Register or replace the client for `id`, resetting its health
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built from `config`
    pub fn register(&self, id: ProviderId, config: &LlmProviderConfig) -> Result<(), ProviderError> {
        let client = build_client(id, config)?;
        self.insert(id, client, RequestDefaults::from(config));
        Ok(())
    }

    /// Register a prebuilt client without model defaults
    pub fn register_client(&self, id: ProviderId, client: Arc<dyn TransportClient>) {
        self.insert(id, client, RequestDefaults::default());
    }

    fn insert(&self, id: ProviderId, client: Arc<dyn TransportClient>, defaults: RequestDefaults) {
        let replaced = self
            .entries
            .insert(
                id,
                Entry {
                    client,
                    defaults: Arc::new(defaults),
                },
            )
            .is_some();

        self.health.insert(id, ProviderHealth::unknown());

        tracing::info!(provider = %id, replaced, "registered provider");
    }

    /// Remove a provider, returning whether it was registered
    pub fn unregister(&self, id: ProviderId) -> bool {
        self.health.remove(&id);
        self.entries.remove(&id).is_some()
    }

    pub fn is_registered(&self, id: ProviderId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered providers in a stable order
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Pick the provider for a request, falling back to the configured default
    ///
    /// # Errors
    ///
    /// Returns a `validation` error when neither is set
    pub fn resolve(&self, requested: Option<ProviderId>) -> Result<ProviderId, ProviderError> {
        match (requested, self.default) {
            (Some(id), _) | (None, ProviderSelection::Selected(id)) => Ok(id),
            (None, ProviderSelection::Unselected) => Err(ProviderError::validation(
                "request names no provider and no default_provider is configured",
            )),
        }
    }

    /// The client registered under `id`
    ///
    /// # Errors
    ///
    /// Returns `not_found` if nothing is registered under `id`
    pub fn client(&self, id: ProviderId) -> Result<Arc<dyn TransportClient>, ProviderError> {
        self.entry(id).map(|e| e.client)
    }

    fn entry(&self, id: ProviderId) -> Result<Entry, ProviderError> {
        self.entries
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ProviderError::not_found(format!("provider '{id}' is not registered")))
    }

    fn prepare(entry: &Entry, id: ProviderId, request: &CompletionRequest) -> Result<CompletionRequest, ProviderError> {
        let request = entry.defaults.apply(request.clone(), id)?;
        entry.client.validate(&request)?;
        Ok(request)
    }

    /// Complete `request` on provider `id`, retrying transient failures
    ///
    /// Responses without upstream usage get an estimate.
    ///
    /// # Errors
    ///
    /// Returns `not_found` for an unregistered provider, `validation` for a
    /// rejected request, or the last upstream error
    pub async fn complete(&self, id: ProviderId, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let entry = self.entry(id)?;
        let request = Self::prepare(&entry, id, request)?;

        let mut response = self.retry.run(|| entry.client.complete(&request)).await?;
        ensure_usage(&mut response, &request, entry.client.capabilities().token_width);

        tracing::debug!(provider = %id, model = %response.model, "completion finished");

        Ok(response)
    }

    /// Open a stream on provider `id`
    ///
    /// Only opening the stream is retried; errors after the first chunk end
    /// the stream.
    ///
    /// # Errors
    ///
    /// Same as [`ProviderRegistry::complete`]
    pub async fn stream(&self, id: ProviderId, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let entry = self.entry(id)?;
        let request = Self::prepare(&entry, id, request)?;

        self.retry.run(|| entry.client.stream(&request)).await
    }

    /// Probe provider `id` and cache the outcome
    ///
    /// Never fails; an unregistered provider is simply unhealthy.
    pub async fn health_check(&self, id: ProviderId) -> bool {
        let Ok(entry) = self.entry(id) else {
            return false;
        };

        let started = Instant::now();
        let result = entry.client.probe().await;
        let latency = started.elapsed();

        let state = match &result {
            Ok(()) => HealthState::Healthy,
            Err(e) => {
                tracing::warn!(provider = %id, error = %e, "provider health check failed");
                HealthState::Unhealthy
            }
        };

        // A client replaced or removed while being checked keeps the health its
        // registration left behind; the entry guard stays held so a
        // concurrent register cannot slip in before the write
        if let Some(current) = self.entries.get(&id)
            && Arc::ptr_eq(&current.client, &entry.client)
        {
            self.health.insert(
                id,
                ProviderHealth {
                    state,
                    last_checked: Some(jiff::Timestamp::now()),
                    latency_ms: Some(millis(latency)),
                },
            );
        }

        result.is_ok()
    }

    /// Cached health of provider `id`
    pub fn health(&self, id: ProviderId) -> Option<ProviderHealth> {
        self.health.get(&id).map(|h| h.value().clone())
    }

    /// First provider in `task`'s preference order that appears in `candidates`
    pub fn recommend(task: TaskKind, candidates: &[ProviderId]) -> Option<ProviderId> {
        task.preference().into_iter().find(|id| candidates.contains(id))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
