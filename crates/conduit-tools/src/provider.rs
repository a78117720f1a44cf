use std::sync::Arc;

use async_trait::async_trait;
use conduit_config::{ToolProviderConfig, ToolProviderKind};

use crate::error::ToolError;
use crate::search::SearchToolProvider;
use crate::types::{HealthReport, ProviderState, ResourceContent, ResourceDescriptor, ToolDefinition, ToolResult};

/// External service that advertises and executes tools
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Registration id
    fn id(&self) -> &str;

    fn state(&self) -> ProviderState;

    /// Probe the service and transition to [`ProviderState::Connected`]
    async fn initialize(&self) -> Result<(), ToolError>;

    async fn tools(&self) -> Result<Vec<ToolDefinition>, ToolError>;

    async fn resources(&self) -> Result<Vec<ResourceDescriptor>, ToolError>;

    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ToolError>;

    /// Execute `name` with `arguments`
    ///
    /// Failures come back as an error [`ToolResult`], never as an `Err`.
    async fn execute_tool(&self, call_id: &str, name: &str, arguments: serde_json::Value) -> ToolResult;

    /// Liveness and latency; leaves call history untouched
    async fn health_check(&self) -> HealthReport;

    /// Release held state and transition to [`ProviderState::Disconnected`]
    async fn disconnect(&self);
}

/// Build the provider described by `config`, validating it first
///
/// The returned provider is not yet initialized.
///
/// # Errors
///
/// Returns [`ToolError::InvalidConfig`] when validation fails
pub fn build_provider(id: &str, config: &ToolProviderConfig) -> Result<Arc<dyn ToolProvider>, ToolError> {
    let provider: Arc<dyn ToolProvider> = match &config.kind {
        ToolProviderKind::Search(search) => Arc::new(SearchToolProvider::new(id, search.clone())?),
    };

    Ok(provider)
}
