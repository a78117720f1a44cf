//! Request preparation shared by every provider

use std::collections::BTreeMap;

use conduit_config::{LlmProviderConfig, ProviderId};

use crate::error::ProviderError;
use crate::types::{CompletionRequest, Role};

/// Per-provider model defaults applied before dispatch
#[derive(Debug, Clone, Default)]
pub struct RequestDefaults {
    pub default_model: Option<String>,
    /// Explicit compatibility table from requested to substituted model
    pub model_aliases: BTreeMap<String, String>,
}

impl From<&LlmProviderConfig> for RequestDefaults {
    fn from(config: &LlmProviderConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            model_aliases: config.model_aliases.clone(),
        }
    }
}

impl RequestDefaults {
    /// Normalize `request` for `provider`
    ///
    /// Only the first system message is honored and it is moved to the
    /// front. A missing model falls back to the configured default and
    /// aliased models are substituted.
    ///
    /// # Errors
    ///
    /// Returns a `validation` error when no model can be determined
    pub fn apply(&self, mut request: CompletionRequest, provider: ProviderId) -> Result<CompletionRequest, ProviderError> {
        hoist_system_message(&mut request, provider);

        if request.model.is_empty() {
            request.model = self.default_model.clone().ok_or_else(|| {
                ProviderError::validation(format!(
                    "request names no model and provider '{provider}' has no default_model"
                ))
            })?;
        }

        if let Some(target) = self.model_aliases.get(&request.model) {
            tracing::info!(
                provider = %provider,
                requested = %request.model,
                substituted = %target,
                "applying model alias"
            );
            request.model.clone_from(target);
        }

        Ok(request)
    }
}

fn hoist_system_message(request: &mut CompletionRequest, provider: ProviderId) {
    let Some(first) = request.messages.iter().position(|m| m.role == Role::System) else {
        return;
    };

    let system = request.messages.remove(first);
    let before = request.messages.len();
    request.messages.retain(|m| m.role != Role::System);

    let dropped = before - request.messages.len();
    if dropped > 0 {
        tracing::warn!(provider = %provider, dropped, "ignoring additional system messages");
    }

    request.messages.insert(0, system);
}
