//! Live set of tool providers and the tools they publish

use std::sync::Arc;

use futures_util::future::join_all;
use indexmap::IndexMap;
use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::ToolError;
use crate::provider::ToolProvider;
use crate::types::{HealthReport, ProviderState, ResourceDescriptor, ToolDefinition};

/// How a provider participates in requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistrationOptions {
    /// Disabled providers are kept but never offered to a model
    pub enabled: bool,
    /// Offer this provider's tools without the caller asking
    pub auto_inject: bool,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_inject: true,
        }
    }
}

/// Selects providers whose tools are listed
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub enabled_only: bool,
    pub auto_inject_only: bool,
    /// Restrict to these provider ids
    pub providers: Option<Vec<String>>,
}

impl ToolFilter {
    /// Enabled providers eligible for automatic injection
    pub fn auto_inject() -> Self {
        Self {
            enabled_only: true,
            auto_inject_only: true,
            providers: None,
        }
    }

    fn matches(&self, id: &str, options: RegistrationOptions) -> bool {
        (!self.enabled_only || options.enabled)
            && (!self.auto_inject_only || options.auto_inject)
            && self.providers.as_ref().is_none_or(|ids| ids.iter().any(|p| p == id))
    }
}

/// Registration record of one provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    pub id: String,
    pub state: ProviderState,
    pub options: RegistrationOptions,
    pub last_health_check: Option<Timestamp>,
    pub tools: Vec<ToolDefinition>,
    pub resources: Vec<ResourceDescriptor>,
}

struct Entry {
    handle: Arc<dyn ToolProvider>,
    options: RegistrationOptions,
    /// Names published at registration, used for collision checks and lookup
    tools: Vec<ToolDefinition>,
    resources: Vec<ResourceDescriptor>,
    last_health_check: Option<Timestamp>,
}

/// Registry of tool providers keyed by id
///
/// Reads run concurrently; registration and unregistration serialize on the
/// write lock, which also guards tool name uniqueness.
#[derive(Default)]
pub struct ToolRegistry {
    providers: RwLock<IndexMap<String, Entry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an initialized provider
    ///
    /// # Errors
    ///
    /// Fails if the id is taken, the provider's tools cannot be listed, or
    /// any of its tool names is already published by another provider
    pub async fn register_provider(
        &self,
        id: &str,
        handle: Arc<dyn ToolProvider>,
        options: RegistrationOptions,
    ) -> Result<(), ToolError> {
        let tools = handle.tools().await?;
        let resources = handle.resources().await.unwrap_or_else(|e| {
            tracing::warn!(provider = id, error = %e, "failed to list resources");
            Vec::new()
        });

        for (i, tool) in tools.iter().enumerate() {
            if tools[..i].iter().any(|t| t.name == tool.name) {
                return Err(ToolError::NameCollision {
                    tool: tool.name.clone(),
                    provider: id.to_owned(),
                });
            }
        }

        let mut providers = self.providers.write().await;

        if providers.contains_key(id) {
            return Err(ToolError::AlreadyRegistered { id: id.to_owned() });
        }

        for (existing, entry) in providers.iter() {
            if let Some(tool) = tools.iter().find(|t| entry.tools.iter().any(|e| e.name == t.name)) {
                return Err(ToolError::NameCollision {
                    tool: tool.name.clone(),
                    provider: existing.clone(),
                });
            }
        }

        tracing::info!(provider = id, tools = tools.len(), "registered tool provider");

        providers.insert(
            id.to_owned(),
            Entry {
                handle,
                options,
                tools,
                resources,
                last_health_check: None,
            },
        );

        Ok(())
    }

    /// Remove a provider and disconnect it
    ///
    /// Lookups issued after this returns no longer see its tools.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ProviderNotFound`] for an unknown id
    pub async fn unregister_provider(&self, id: &str) -> Result<(), ToolError> {
        let entry = self
            .providers
            .write()
            .await
            .shift_remove(id)
            .ok_or_else(|| ToolError::ProviderNotFound { id: id.to_owned() })?;

        entry.handle.disconnect().await;
        tracing::info!(provider = id, "unregistered tool provider");

        Ok(())
    }

    /// Tool definitions of connected providers matching `filter`
    ///
    /// Definitions come from the registration snapshot, the same one tool
    /// lookup uses, so everything listed can be routed.
    pub async fn list_tools(&self, filter: &ToolFilter) -> Vec<ToolDefinition> {
        let providers = self.providers.read().await;
        let mut tools: Vec<ToolDefinition> = Vec::new();

        for (id, entry) in providers.iter().filter(|(id, entry)| filter.matches(id, entry.options)) {
            let state = entry.handle.state();
            if state != ProviderState::Connected {
                tracing::debug!(provider = %id, state = %state, "skipping tool provider that is not connected");
                continue;
            }

            for tool in &entry.tools {
                if !tools.iter().any(|t| t.name == tool.name) {
                    tools.push(tool.clone());
                }
            }
        }

        tools
    }

    /// Enabled provider publishing `name`, found by linear scan
    pub async fn find_provider_for_tool(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers
            .read()
            .await
            .values()
            .find(|entry| entry.options.enabled && entry.tools.iter().any(|t| t.name == name))
            .map(|entry| Arc::clone(&entry.handle))
    }

    pub async fn provider(&self, id: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers.read().await.get(id).map(|e| Arc::clone(&e.handle))
    }

    /// Probe every provider concurrently
    pub async fn health_check_all(&self) -> IndexMap<String, HealthReport> {
        let handles: Vec<_> = self
            .providers
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.handle)))
            .collect();

        let reports = join_all(handles.into_iter().map(|(id, handle)| async move {
            let report = handle.health_check().await;
            if !report.healthy {
                tracing::warn!(provider = %id, message = ?report.message, "tool provider unhealthy");
            }
            (id, report)
        }))
        .await;

        let now = Timestamp::now();
        let mut providers = self.providers.write().await;

        for (id, _) in &reports {
            if let Some(entry) = providers.get_mut(id) {
                entry.last_health_check = Some(now);
            }
        }

        reports.into_iter().collect()
    }

    /// Snapshot of every registration record
    pub async fn records(&self) -> Vec<ProviderRecord> {
        self.providers
            .read()
            .await
            .iter()
            .map(|(id, entry)| ProviderRecord {
                id: id.clone(),
                state: entry.handle.state(),
                options: entry.options,
                last_health_check: entry.last_health_check,
                tools: entry.tools.clone(),
                resources: entry.resources.clone(),
            })
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.providers.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::types::{ResourceContent, ToolResult};

    struct StaticProvider {
        id: String,
        tools: Mutex<Vec<&'static str>>,
        state: Mutex<ProviderState>,
    }

    impl StaticProvider {
        fn new(id: &str, tools: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_owned(),
                tools: Mutex::new(tools.to_vec()),
                state: Mutex::new(ProviderState::Connected),
            })
        }
    }

    #[async_trait]
    impl ToolProvider for StaticProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn state(&self) -> ProviderState {
            *self.state.lock().unwrap()
        }

        async fn initialize(&self) -> Result<(), ToolError> {
            Ok(())
        }

        async fn tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
            if self.state() == ProviderState::Error {
                return Err(ToolError::Connection("gone".into()));
            }
            Ok(self
                .tools
                .lock()
                .unwrap()
                .iter()
                .map(|name| ToolDefinition {
                    name: (*name).to_owned(),
                    description: String::new(),
                    parameters: json!({"type": "object"}),
                })
                .collect())
        }

        async fn resources(&self) -> Result<Vec<ResourceDescriptor>, ToolError> {
            Ok(Vec::new())
        }

        async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ToolError> {
            Err(ToolError::ResourceNotFound { uri: uri.to_owned() })
        }

        async fn execute_tool(&self, call_id: &str, _name: &str, _arguments: serde_json::Value) -> ToolResult {
            ToolResult::text(call_id, "ok")
        }

        async fn health_check(&self) -> HealthReport {
            HealthReport {
                healthy: self.state() == ProviderState::Connected,
                latency_ms: 1,
                message: None,
            }
        }

        async fn disconnect(&self) {
            *self.state.lock().unwrap() = ProviderState::Disconnected;
        }
    }

    #[tokio::test]
    async fn duplicate_tool_names_are_rejected() {
        let registry = ToolRegistry::new();

        registry
            .register_provider("a", StaticProvider::new("a", &["search"]), RegistrationOptions::default())
            .await
            .unwrap();

        let err = registry
            .register_provider("b", StaticProvider::new("b", &["search"]), RegistrationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::NameCollision { ref tool, ref provider } if tool == "search" && provider == "a"));

        let tools = registry.list_tools(&ToolFilter::default()).await;
        assert_eq!(tools.iter().filter(|t| t.name == "search").count(), 1);
    }

    #[tokio::test]
    async fn duplicate_ids_and_self_collisions_are_rejected() {
        let registry = ToolRegistry::new();
        let options = RegistrationOptions::default();

        registry
            .register_provider("a", StaticProvider::new("a", &["x"]), options)
            .await
            .unwrap();

        assert!(matches!(
            registry.register_provider("a", StaticProvider::new("a", &["y"]), options).await,
            Err(ToolError::AlreadyRegistered { .. })
        ));
        assert!(matches!(
            registry.register_provider("b", StaticProvider::new("b", &["z", "z"]), options).await,
            Err(ToolError::NameCollision { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_registrations_keep_names_unique() {
        let registry = Arc::new(ToolRegistry::new());

        let attempts = (0..8).map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let id = format!("p{i}");
                registry
                    .register_provider(&id, StaticProvider::new(&id, &["search"]), RegistrationOptions::default())
                    .await
            })
        });

        let results = join_all(attempts).await;
        let ok = results.into_iter().filter(|r| matches!(r, Ok(Ok(())))).count();

        assert_eq!(ok, 1);
        assert_eq!(registry.list_tools(&ToolFilter::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn filters_apply_to_listing() {
        let registry = ToolRegistry::new();

        registry
            .register_provider("auto", StaticProvider::new("auto", &["a"]), RegistrationOptions::default())
            .await
            .unwrap();
        registry
            .register_provider(
                "explicit",
                StaticProvider::new("explicit", &["b"]),
                RegistrationOptions {
                    enabled: true,
                    auto_inject: false,
                },
            )
            .await
            .unwrap();
        registry
            .register_provider(
                "off",
                StaticProvider::new("off", &["c"]),
                RegistrationOptions {
                    enabled: false,
                    auto_inject: true,
                },
            )
            .await
            .unwrap();

        let names = |tools: Vec<ToolDefinition>| tools.into_iter().map(|t| t.name).collect::<Vec<_>>();

        assert_eq!(names(registry.list_tools(&ToolFilter::auto_inject()).await), ["a"]);
        assert_eq!(names(registry.list_tools(&ToolFilter::default()).await), ["a", "b", "c"]);

        let only_explicit = ToolFilter {
            enabled_only: true,
            auto_inject_only: false,
            providers: Some(vec!["explicit".to_owned()]),
        };
        assert_eq!(names(registry.list_tools(&only_explicit).await), ["b"]);

        assert!(registry.find_provider_for_tool("c").await.is_none());
        assert_eq!(registry.find_provider_for_tool("b").await.unwrap().id(), "explicit");
    }

    #[tokio::test]
    async fn providers_in_error_are_not_listed() {
        let registry = ToolRegistry::new();
        let broken = StaticProvider::new("broken", &["b"]);

        registry
            .register_provider("broken", broken.clone(), RegistrationOptions::default())
            .await
            .unwrap();
        registry
            .register_provider("fine", StaticProvider::new("fine", &["f"]), RegistrationOptions::default())
            .await
            .unwrap();

        *broken.state.lock().unwrap() = ProviderState::Error;

        let tools = registry.list_tools(&ToolFilter::default()).await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "f");
    }

    #[tokio::test]
    async fn listing_and_lookup_agree_when_live_tools_change() {
        let registry = ToolRegistry::new();
        let provider = StaticProvider::new("web", &["search"]);

        registry
            .register_provider("web", provider.clone(), RegistrationOptions::default())
            .await
            .unwrap();

        *provider.tools.lock().unwrap() = vec!["search", "late_addition"];

        let names: Vec<_> = registry
            .list_tools(&ToolFilter::default())
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["search"]);
        assert!(registry.find_provider_for_tool("late_addition").await.is_none());

        *provider.tools.lock().unwrap() = Vec::new();

        assert_eq!(registry.list_tools(&ToolFilter::default()).await.len(), 1);
        assert_eq!(registry.find_provider_for_tool("search").await.unwrap().id(), "web");
    }

    #[tokio::test]
    async fn unregistered_tools_are_no_longer_found() {
        let registry = ToolRegistry::new();
        let provider = StaticProvider::new("web", &["search"]);

        registry
            .register_provider("web", provider.clone(), RegistrationOptions::default())
            .await
            .unwrap();

        let listed = registry.list_tools(&ToolFilter::auto_inject()).await;
        assert_eq!(listed.len(), 1);

        registry.unregister_provider("web").await.unwrap();

        assert!(registry.find_provider_for_tool("search").await.is_none());
        assert_eq!(provider.state(), ProviderState::Disconnected);
        assert!(matches!(
            registry.unregister_provider("web").await,
            Err(ToolError::ProviderNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn health_check_all_reports_every_provider() {
        let registry = ToolRegistry::new();
        let sick = StaticProvider::new("sick", &["s"]);

        registry
            .register_provider("ok", StaticProvider::new("ok", &["o"]), RegistrationOptions::default())
            .await
            .unwrap();
        registry
            .register_provider("sick", sick.clone(), RegistrationOptions::default())
            .await
            .unwrap();
        *sick.state.lock().unwrap() = ProviderState::Error;

        let reports = registry.health_check_all().await;
        assert!(reports["ok"].healthy);
        assert!(!reports["sick"].healthy);

        let records = registry.records().await;
        assert!(records.iter().all(|r| r.last_health_check.is_some()));
        assert_eq!(records[1].state, ProviderState::Error);
    }
}
