use std::time::Duration;

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

/// Tool-calling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// How many resubmission turns a single request may take
    #[serde(default = "default_max_continuations")]
    pub max_continuations: u32,
    /// Upper bound on concurrently executing tool calls within one turn
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Deadline for a single tool call
    #[serde(default = "default_call_timeout", deserialize_with = "crate::duration::deserialize")]
    pub call_timeout: Duration,
    /// Entries kept per conversation history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Conversations whose history is retained; the least recently active is forgotten first
    #[serde(default = "default_history_conversations")]
    pub history_conversations: usize,
    /// Synthesize a system prompt listing tools when the request has none
    #[serde(default = "default_true")]
    pub inject_system_prompt: bool,
    /// Tool providers keyed by their id
    #[serde(default)]
    pub providers: IndexMap<String, ToolProviderConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_continuations: default_max_continuations(),
            max_concurrency: default_max_concurrency(),
            call_timeout: default_call_timeout(),
            history_capacity: default_history_capacity(),
            history_conversations: default_history_conversations(),
            inject_system_prompt: true,
            providers: IndexMap::new(),
        }
    }
}

/// Configuration of one tool provider
#[derive(Debug, Clone, Deserialize)]
pub struct ToolProviderConfig {
    /// Disabled providers are registered but never offered to a model
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Attach this provider's tools to every request automatically
    #[serde(default = "default_true")]
    pub auto_inject: bool,
    /// Kind-specific settings
    #[serde(flatten)]
    pub kind: ToolProviderKind,
}

/// Typed per-kind tool provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolProviderKind {
    /// Web search over a Tavily-style HTTP API
    Search(SearchProviderConfig),
}

/// Web search provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct SearchProviderConfig {
    /// Search endpoint receiving `POST` queries
    pub endpoint: Url,
    /// Bearer token for the search API
    pub api_key: SecretString,
    /// Results returned when the model does not ask for a count
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Deadline for a single search request
    #[serde(default = "default_search_timeout", deserialize_with = "crate::duration::deserialize")]
    pub timeout: Duration,
    /// Recent calls retained for the history resource
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl SearchProviderConfig {
    /// Upper bound on `max_results`
    pub const MAX_RESULTS_LIMIT: u32 = 20;

    /// Check credentials and limits before the provider is built
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err("search api_key must not be empty".to_owned());
        }

        if !(1..=Self::MAX_RESULTS_LIMIT).contains(&self.max_results) {
            return Err(format!(
                "search max_results must be between 1 and {}, got {}",
                Self::MAX_RESULTS_LIMIT,
                self.max_results
            ));
        }

        if self.history_capacity == 0 {
            return Err("search history_capacity must be at least 1".to_owned());
        }

        Ok(())
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_continuations() -> u32 {
    1
}

const fn default_max_concurrency() -> usize {
    4
}

const fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_history_capacity() -> usize {
    50
}

const fn default_history_conversations() -> usize {
    1_000
}

const fn default_max_results() -> u32 {
    5
}

const fn default_search_timeout() -> Duration {
    Duration::from_secs(15)
}
