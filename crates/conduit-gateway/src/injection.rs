//! Automatic tool injection and the tool-call continuation loop

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use conduit_config::ToolsConfig;
use conduit_llm::{CompletionRequest, CompletionResponse, Message, ProviderError, ProviderId, ProviderRegistry, ToolCall};
use conduit_tools::{ToolDefinition, ToolFilter, ToolProvider, ToolRegistry, ToolResult};
use futures_util::{FutureExt, StreamExt, stream};

use crate::history::{DEFAULT_CONVERSATION, HistoryEntry, HistoryStore};

/// Knobs of the continuation loop
#[derive(Debug, Clone)]
pub struct InjectionSettings {
    /// Resubmissions allowed per request
    pub max_continuations: u32,
    /// Tool calls of one turn executing at once
    pub max_concurrency: usize,
    pub call_timeout: Duration,
    pub inject_system_prompt: bool,
}

impl From<&ToolsConfig> for InjectionSettings {
    fn from(config: &ToolsConfig) -> Self {
        Self {
            max_continuations: config.max_continuations,
            max_concurrency: config.max_concurrency,
            call_timeout: config.call_timeout,
            inject_system_prompt: config.inject_system_prompt,
        }
    }
}

impl Default for InjectionSettings {
    fn default() -> Self {
        Self::from(&ToolsConfig::default())
    }
}

/// Per-request tool options
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    /// Tool providers the caller opted into; `None` offers every enabled
    /// provider marked for automatic injection
    pub enabled_providers: Option<Vec<String>>,
    /// History bucket for the calls made while serving this request
    pub conversation_id: Option<String>,
}

impl ToolOptions {
    fn filter(&self) -> ToolFilter {
        ToolFilter {
            enabled_only: true,
            auto_inject_only: self.enabled_providers.is_none(),
            providers: self.enabled_providers.clone(),
        }
    }

    fn allows(&self, provider: &str) -> bool {
        self.enabled_providers
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|id| id == provider))
    }
}

/// Attaches tools to completions and runs the calls the model makes
pub struct AutoInjectionManager {
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    history: Arc<HistoryStore>,
    settings: InjectionSettings,
}

impl AutoInjectionManager {
    pub const fn new(
        providers: Arc<ProviderRegistry>,
        tools: Arc<ToolRegistry>,
        history: Arc<HistoryStore>,
        settings: InjectionSettings,
    ) -> Self {
        Self {
            providers,
            tools,
            history,
            settings,
        }
    }

    /// Complete `request` on `provider`, executing tool calls in between
    ///
    /// Without eligible tool providers the request goes through untouched.
    /// Tool failures become error results the model gets to see; only
    /// upstream failures and an exhausted continuation budget end the turn.
    ///
    /// # Errors
    ///
    /// Returns the upstream error, or `continuation_limit` when the model
    /// keeps calling tools after the last allowed resubmission
    pub async fn complete_with_tools(
        &self,
        provider: ProviderId,
        request: CompletionRequest,
        options: &ToolOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let available = self.tools.list_tools(&options.filter()).await;

        if available.is_empty() {
            return self.providers.complete(provider, &request).await;
        }

        let caller_tools: Vec<String> = request.tools.iter().map(|t| t.name().to_owned()).collect();
        let mut request = self.augment(request, &available);
        let conversation = options.conversation_id.as_deref().unwrap_or(DEFAULT_CONVERSATION);

        tracing::debug!(provider = %provider, tools = available.len(), "injected tools into request");

        let mut continuations = 0;

        loop {
            let response = self.providers.complete(provider, &request).await?;
            let calls = response.tool_calls().to_vec();

            if calls.is_empty() {
                return Ok(response);
            }

            // The caller runs its own tools, and the turn cannot resume without their results
            if calls.iter().any(|c| caller_tools.contains(&c.function.name)) {
                return Ok(response);
            }

            if continuations >= self.settings.max_continuations {
                tracing::warn!(
                    provider = %provider,
                    limit = self.settings.max_continuations,
                    "model kept requesting tools, giving up"
                );
                return Err(ProviderError::continuation_limit(self.settings.max_continuations));
            }
            continuations += 1;

            let results = self.execute_all(&calls, options, conversation).await;

            request.messages.push(Message::assistant_tool_calls(
                response.text().unwrap_or_default(),
                calls.clone(),
            ));

            for (call, result) in calls.iter().zip(results) {
                request.messages.push(
                    Message::tool(&call.id, &call.function.name, result.to_message_content()).with_error(result.is_error),
                );
            }
        }
    }

    /// Merge `available` into the request and add a system prompt if it has none
    fn augment(&self, mut request: CompletionRequest, available: &[ToolDefinition]) -> CompletionRequest {
        let injected: Vec<_> = available
            .iter()
            .filter(|tool| !request.tools.iter().any(|t| t.name() == tool.name))
            .map(|tool| {
                conduit_llm::ToolDefinition::function(&tool.name, &tool.description, tool.parameters.clone())
            })
            .collect();

        if self.settings.inject_system_prompt && !request.has_system_message() {
            request.messages.insert(0, Message::system(system_prompt(available)));
        }

        request.tools.extend(injected);
        request
    }

    /// Execute `calls` with bounded concurrency, results in call order
    async fn execute_all(&self, calls: &[ToolCall], options: &ToolOptions, conversation: &str) -> Vec<ToolResult> {
        let pending: Vec<_> = calls
            .iter()
            .map(|call| self.execute(call, options, conversation))
            .collect();

        stream::iter(pending)
            .buffered(self.settings.max_concurrency.max(1))
            .collect()
            .await
    }

    async fn execute(&self, call: &ToolCall, options: &ToolOptions, conversation: &str) -> ToolResult {
        let name = call.function.name.as_str();

        let parsed = parse_arguments(&call.function.arguments);

        let result = match &parsed {
            Err(e) => ToolResult::error(&call.id, format!("invalid arguments for tool '{name}': {e}")),
            Ok(arguments) => match self.resolve(name, options).await {
                None => {
                    tracing::warn!(tool = name, "model called a tool nobody provides");
                    ToolResult::error(&call.id, ProviderError::tool_not_found(name).message())
                }
                Some(provider) => self.invoke(provider.as_ref(), call, arguments.clone()).await,
            },
        };

        if result.is_error {
            tracing::debug!(tool = name, call_id = %call.id, "tool call failed");
        }

        // Unparseable arguments are kept verbatim
        let arguments = parsed.unwrap_or_else(|_| serde_json::Value::String(call.function.arguments.clone()));
        self.history
            .append(conversation, HistoryEntry::new(name, arguments, result.clone()));

        result
    }

    /// Provider owning `name`, if the caller allows it
    ///
    /// Resolution happens at execution time, so a provider unregistered
    /// since the tools were listed is no longer found.
    async fn resolve(&self, name: &str, options: &ToolOptions) -> Option<Arc<dyn ToolProvider>> {
        self.tools
            .find_provider_for_tool(name)
            .await
            .filter(|provider| options.allows(provider.id()))
    }

    async fn invoke(&self, provider: &dyn ToolProvider, call: &ToolCall, arguments: serde_json::Value) -> ToolResult {
        let name = call.function.name.as_str();
        let execution = AssertUnwindSafe(provider.execute_tool(&call.id, name, arguments)).catch_unwind();

        let mut result = match tokio::time::timeout(self.settings.call_timeout, execution).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(provider = provider.id(), tool = name, panic = %message, "tool provider panicked");
                ToolResult::error(&call.id, format!("tool '{name}' failed: {message}"))
            }
            Err(_) => {
                tracing::warn!(provider = provider.id(), tool = name, "tool call timed out");
                ToolResult::error(
                    &call.id,
                    format!("tool '{name}' timed out after {}ms", self.settings.call_timeout.as_millis()),
                )
            }
        };

        result.call_id.clone_from(&call.id);

        if result.is_error && result.to_message_content().trim().is_empty() {
            result = ToolResult::error(&call.id, format!("tool '{name}' failed without a message"));
        }

        result
    }
}

/// Arguments as JSON; models send an empty string for argument-less calls
fn parse_arguments(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }

    serde_json::from_str(raw)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "provider panicked".to_owned())
}

fn system_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(
        "You can call the following tools. Use one when it helps answer the request, \
         otherwise answer directly.\n",
    );

    for tool in tools {
        prompt.push_str("\n- ");
        prompt.push_str(&tool.name);
        if !tool.description.is_empty() {
            prompt.push_str(": ");
            prompt.push_str(&tool.description);
        }
    }

    prompt
}
