use std::{collections::BTreeMap, time::Duration};

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use url::Url;

/// Closed set of upstream LLM providers conduit can talk to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum ProviderId {
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    #[strum(serialize = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    #[strum(serialize = "google")]
    Google,
    /// Any server speaking the OpenAI chat completions protocol
    #[serde(rename = "openai-like")]
    #[strum(serialize = "openai-like")]
    OpenAiLike,
}

impl ProviderId {
    /// Public API root used when no `base_url` is configured
    pub const fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::Google => Some("https://generativelanguage.googleapis.com/v1beta"),
            Self::OpenAiLike => None,
        }
    }
}

/// Which provider serves requests that do not name one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<ProviderId>")]
pub enum ProviderSelection {
    /// No default; such requests are rejected
    #[default]
    Unselected,
    Selected(ProviderId),
}

impl From<Option<ProviderId>> for ProviderSelection {
    fn from(value: Option<ProviderId>) -> Self {
        value.map_or(Self::Unselected, Self::Selected)
    }
}

/// Top-level LLM configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider used when a request names none
    #[serde(default)]
    pub default_provider: ProviderSelection,
    /// Backoff applied to retryable upstream failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Provider configurations keyed by provider id
    #[serde(default)]
    pub providers: IndexMap<ProviderId, LlmProviderConfig>,
}

/// Retry coordinator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay", deserialize_with = "crate::duration::deserialize")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay", deserialize_with = "crate::duration::deserialize")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

/// Configuration for a single upstream provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmProviderConfig {
    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// API root, required for `openai-like`
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model used when a request leaves `model` empty
    #[serde(default)]
    pub default_model: Option<String>,
    /// Per-request timeout
    #[serde(default = "default_request_timeout", deserialize_with = "crate::duration::deserialize")]
    pub timeout: Duration,
    /// Explicit requested-model to served-model substitutions
    #[serde(default)]
    pub model_aliases: BTreeMap<String, String>,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            default_model: None,
            timeout: default_request_timeout(),
            model_aliases: BTreeMap::new(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay() -> Duration {
    Duration::from_millis(250)
}

const fn default_max_delay() -> Duration {
    Duration::from_secs(8)
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}
