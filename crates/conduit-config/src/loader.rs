use std::path::Path;

use crate::{Config, ProviderId, ToolProviderKind};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Placeholders of the form `{{ env.VAR }}` are expanded before parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// resolved, the TOML is malformed, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`], minus file access
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;
        config.validate()?;

        Ok(config)
    }

    /// Check that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_llm()?;
        self.validate_tools()?;
        Ok(())
    }

    fn validate_llm(&self) -> anyhow::Result<()> {
        let retry = &self.llm.retry;

        if retry.max_attempts == 0 {
            anyhow::bail!("llm.retry.max_attempts must be at least 1");
        }

        if retry.base_delay > retry.max_delay {
            anyhow::bail!(
                "llm.retry.base_delay ({:?}) must not exceed max_delay ({:?})",
                retry.base_delay,
                retry.max_delay
            );
        }

        for (id, provider) in &self.llm.providers {
            if *id == ProviderId::OpenAiLike && provider.base_url.is_none() {
                anyhow::bail!("provider '{id}' requires base_url");
            }

            if provider.default_model.as_deref().is_some_and(str::is_empty) {
                anyhow::bail!("provider '{id}' has an empty default_model");
            }

            for (from, to) in &provider.model_aliases {
                if from.is_empty() || to.is_empty() {
                    anyhow::bail!("provider '{id}' has an empty model alias entry");
                }
            }
        }

        if self.llm.providers.is_empty() {
            tracing::warn!("no llm providers configured, every completion will fail");
        }

        if let crate::ProviderSelection::Selected(id) = self.llm.default_provider
            && !self.llm.providers.contains_key(&id)
        {
            anyhow::bail!("llm.default_provider '{id}' is not configured under llm.providers");
        }

        Ok(())
    }

    fn validate_tools(&self) -> anyhow::Result<()> {
        let tools = &self.tools;

        if tools.max_concurrency == 0 {
            anyhow::bail!("tools.max_concurrency must be at least 1");
        }

        if tools.history_capacity == 0 {
            anyhow::bail!("tools.history_capacity must be at least 1");
        }

        if tools.history_conversations == 0 {
            anyhow::bail!("tools.history_conversations must be at least 1");
        }

        for (id, provider) in &tools.providers {
            if id.trim().is_empty() {
                anyhow::bail!("tool provider ids must not be empty");
            }

            match &provider.kind {
                ToolProviderKind::Search(search) => search
                    .validate()
                    .map_err(|e| anyhow::anyhow!("tool provider '{id}': {e}"))?,
            }
        }

        Ok(())
    }
}
