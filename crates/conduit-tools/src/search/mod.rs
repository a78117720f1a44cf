//! Web search tool provider over a Tavily-style HTTP API

mod wire;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use conduit_config::SearchProviderConfig;
use jiff::Timestamp;
use reqwest::{Client, StatusCode};
use schemars::JsonSchema;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;

use self::wire::{SearchHit, SearchRequest, SearchResponse, Topic};
use crate::error::ToolError;
use crate::provider::ToolProvider;
use crate::types::{
    HealthReport, ProviderState, ResourceContent, ResourceDescriptor, ToolContent, ToolDefinition, ToolResult,
};

pub const WEB_SEARCH: &str = "web_search";
pub const NEWS_SEARCH: &str = "news_search";

pub const HISTORY_URI: &str = "search://history";
pub const STATS_URI: &str = "search://stats";

const MAX_QUERY_CHARS: usize = 400;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct WebSearchArgs {
    /// Search query, at most 400 characters
    query: String,
    /// Number of results to return, between 1 and 20
    #[serde(default)]
    max_results: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct NewsSearchArgs {
    /// Search query, at most 400 characters
    query: String,
    /// Number of results to return, between 1 and 20
    #[serde(default)]
    max_results: Option<u32>,
    /// Only include articles published within this many days
    #[serde(default)]
    days: Option<u32>,
}

/// Validated search derived from a tool call
#[derive(Debug)]
struct Query {
    tool: &'static str,
    topic: Topic,
    text: String,
    max_results: u32,
    days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRecord {
    tool: &'static str,
    query: String,
    result_count: usize,
    is_error: bool,
    timestamp: Timestamp,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct Stats {
    searches: u64,
    failures: u64,
    last_search: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct Memory {
    history: VecDeque<SearchRecord>,
    stats: Stats,
}

/// Tool provider exposing `web_search` and `news_search`
pub struct SearchToolProvider {
    id: String,
    config: SearchProviderConfig,
    http: Client,
    state: RwLock<ProviderState>,
    memory: Mutex<Memory>,
}

impl SearchToolProvider {
    /// Validate `config` and build an uninitialized provider
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidConfig`] for a rejected configuration
    pub fn new(id: impl Into<String>, config: SearchProviderConfig) -> Result<Self, ToolError> {
        config.validate().map_err(ToolError::InvalidConfig)?;

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ToolError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            id: id.into(),
            config,
            http,
            state: RwLock::new(ProviderState::Disconnected),
            memory: Mutex::new(Memory::default()),
        })
    }

    fn set_state(&self, state: ProviderState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn memory(&self) -> MutexGuard<'_, Memory> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Authenticated `GET` against the endpoint
    ///
    /// Only rejected credentials and server errors count as unhealthy; search
    /// APIs commonly answer `GET` with 405.
    async fn probe(&self) -> HealthReport {
        let started = Instant::now();

        let result = self
            .http
            .get(self.config.endpoint.clone())
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await;

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let failure = match result {
            Ok(response) if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Some(format!("search API rejected credentials ({})", response.status()))
            }
            Ok(response) if response.status().is_server_error() => {
                Some(format!("search API returned {}", response.status()))
            }
            Ok(_) => None,
            Err(e) => Some(format!("search API unreachable: {e}")),
        };

        HealthReport {
            healthy: failure.is_none(),
            latency_ms,
            message: failure,
        }
    }

    fn parse_query(&self, name: &str, arguments: serde_json::Value) -> Result<Query, String> {
        let invalid = |e: serde_json::Error| format!("invalid arguments for {name}: {e}");

        let (tool, topic, text, max_results, days) = match name {
            WEB_SEARCH => {
                let args: WebSearchArgs = serde_json::from_value(arguments).map_err(invalid)?;
                (WEB_SEARCH, Topic::General, args.query, args.max_results, None)
            }
            NEWS_SEARCH => {
                let args: NewsSearchArgs = serde_json::from_value(arguments).map_err(invalid)?;
                (NEWS_SEARCH, Topic::News, args.query, args.max_results, args.days)
            }
            other => return Err(format!("unknown tool: {other}")),
        };

        let text = text.trim().to_owned();
        if text.is_empty() {
            return Err("query must not be empty".to_owned());
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            return Err(format!("query must be at most {MAX_QUERY_CHARS} characters"));
        }

        let max_results = max_results.unwrap_or(self.config.max_results);
        if !(1..=SearchProviderConfig::MAX_RESULTS_LIMIT).contains(&max_results) {
            return Err(format!(
                "max_results must be between 1 and {}",
                SearchProviderConfig::MAX_RESULTS_LIMIT
            ));
        }

        if days == Some(0) {
            return Err("days must be at least 1".to_owned());
        }

        Ok(Query {
            tool,
            topic,
            text,
            max_results,
            days,
        })
    }

    async fn search(&self, query: &Query) -> Result<SearchResponse, String> {
        let body = SearchRequest {
            query: &query.text,
            max_results: query.max_results,
            topic: query.topic,
            days: query.days,
        };

        let response = self
            .http
            .post(self.config.endpoint.clone())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("search request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("search API returned {status}"));
        }

        let mut parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid search response: {e}"))?;

        parsed
            .results
            .truncate(usize::try_from(query.max_results).unwrap_or(usize::MAX));

        Ok(parsed)
    }

    fn record(&self, query: &Query, result_count: usize, is_error: bool) {
        let now = Timestamp::now();
        let capacity = self.config.history_capacity;
        let mut memory = self.memory();

        memory.history.push_back(SearchRecord {
            tool: query.tool,
            query: query.text.clone(),
            result_count,
            is_error,
            timestamp: now,
        });
        while memory.history.len() > capacity {
            memory.history.pop_front();
        }

        memory.stats.searches += 1;
        if is_error {
            memory.stats.failures += 1;
        }
        memory.stats.last_search = Some(now);
    }

    fn success(call_id: &str, query: &Query, answer: Option<String>, hits: &[SearchHit]) -> ToolResult {
        let summary = if hits.is_empty() {
            format!("No results for \"{}\"", query.text)
        } else {
            format!("Found {} results for \"{}\"", hits.len(), query.text)
        };

        ToolResult::new(
            call_id,
            vec![
                ToolContent::Text { text: summary },
                ToolContent::Json {
                    data: json!({ "answer": answer, "results": hits }),
                },
            ],
        )
    }
}

#[async_trait]
impl ToolProvider for SearchToolProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> ProviderState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn initialize(&self) -> Result<(), ToolError> {
        let report = self.probe().await;

        if report.healthy {
            self.set_state(ProviderState::Connected);
            tracing::info!(provider = %self.id, latency_ms = report.latency_ms, "search provider connected");
            Ok(())
        } else {
            self.set_state(ProviderState::Error);
            Err(ToolError::Connection(report.message.unwrap_or_default()))
        }
    }

    async fn tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        Ok(vec![
            ToolDefinition::from_schema::<WebSearchArgs>(
                WEB_SEARCH,
                "Search the web for current information. Returns titles, URLs and page excerpts.",
            ),
            ToolDefinition::from_schema::<NewsSearchArgs>(
                NEWS_SEARCH,
                "Search recent news articles. Use for events, announcements and anything time-sensitive.",
            ),
        ])
    }

    async fn resources(&self) -> Result<Vec<ResourceDescriptor>, ToolError> {
        Ok(vec![
            ResourceDescriptor {
                uri: HISTORY_URI.to_owned(),
                name: "Search history".to_owned(),
                description: "Most recent searches, oldest first".to_owned(),
                mime_type: "application/json".to_owned(),
            },
            ResourceDescriptor {
                uri: STATS_URI.to_owned(),
                name: "Search statistics".to_owned(),
                description: "Search and failure counters".to_owned(),
                mime_type: "application/json".to_owned(),
            },
        ])
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ToolError> {
        let text = {
            let memory = self.memory();
            match uri {
                HISTORY_URI => serde_json::to_string(&memory.history),
                STATS_URI => serde_json::to_string(&memory.stats),
                _ => return Err(ToolError::ResourceNotFound { uri: uri.to_owned() }),
            }
        }
        .map_err(|e| ToolError::Execution(e.to_string()))?;

        Ok(ResourceContent {
            uri: uri.to_owned(),
            mime_type: "application/json".to_owned(),
            text,
        })
    }

    async fn execute_tool(&self, call_id: &str, name: &str, arguments: serde_json::Value) -> ToolResult {
        if self.state() == ProviderState::Disconnected {
            return ToolResult::error(call_id, format!("search provider '{}' is disconnected", self.id));
        }

        let query = match self.parse_query(name, arguments) {
            Ok(query) => query,
            Err(message) => return ToolResult::error(call_id, message),
        };

        match self.search(&query).await {
            Ok(response) => {
                self.record(&query, response.results.len(), false);
                Self::success(call_id, &query, response.answer, &response.results)
            }
            Err(message) => {
                tracing::warn!(provider = %self.id, tool = query.tool, error = %message, "search failed");
                self.record(&query, 0, true);
                ToolResult::error(call_id, message)
            }
        }
    }

    async fn health_check(&self) -> HealthReport {
        let report = self.probe().await;

        if self.state() != ProviderState::Disconnected {
            self.set_state(if report.healthy {
                ProviderState::Connected
            } else {
                ProviderState::Error
            });
        }

        report
    }

    async fn disconnect(&self) {
        self.set_state(ProviderState::Disconnected);
        *self.memory() = Memory::default();
        tracing::info!(provider = %self.id, "search provider disconnected");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer) -> SearchProviderConfig {
        SearchProviderConfig {
            endpoint: Url::parse(&format!("{}/search", server.uri())).unwrap(),
            api_key: SecretString::from("tvly-test"),
            max_results: 5,
            timeout: Duration::from_secs(5),
            history_capacity: 2,
        }
    }

    async fn connected(server: &MockServer) -> SearchToolProvider {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(405))
            .mount(server)
            .await;

        let provider = SearchToolProvider::new("web", config(server)).unwrap();
        provider.initialize().await.unwrap();
        provider
    }

    async fn mount_results(server: &MockServer) {
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer tvly-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": null,
                "results": [
                    {"title": "Rust", "url": "https://www.rust-lang.org", "content": "A language"},
                    {"title": "Docs", "url": "https://doc.rust-lang.org", "content": "Documentation"}
                ]
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = SearchProviderConfig {
            endpoint: Url::parse("http://localhost/search").unwrap(),
            api_key: SecretString::from(""),
            max_results: 5,
            timeout: Duration::from_secs(1),
            history_capacity: 10,
        };
        assert!(matches!(
            SearchToolProvider::new("web", config.clone()),
            Err(ToolError::InvalidConfig(_))
        ));

        config.api_key = SecretString::from("k");
        config.max_results = 50;
        assert!(SearchToolProvider::new("web", config).is_err());
    }

    #[tokio::test]
    async fn initialize_fails_on_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = SearchToolProvider::new("web", config(&server)).unwrap();
        assert_eq!(provider.state(), ProviderState::Disconnected);

        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, ToolError::Connection(_)));
        assert_eq!(provider.state(), ProviderState::Error);
    }

    #[tokio::test]
    async fn web_search_returns_results_and_records_history() {
        let server = MockServer::start().await;
        let provider = connected(&server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"query": "rust", "topic": "general", "max_results": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"title": "Rust", "url": "https://www.rust-lang.org", "content": "A language"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider
            .execute_tool("call_1", WEB_SEARCH, json!({"query": "  rust "}))
            .await;

        assert!(!result.is_error, "{result:?}");
        assert_eq!(result.call_id, "call_1");
        assert!(result.to_message_content().starts_with("Found 1 results for \"rust\""));

        let history = provider.read_resource(HISTORY_URI).await.unwrap();
        let entries: serde_json::Value = serde_json::from_str(&history.text).unwrap();
        assert_eq!(entries[0]["tool"], WEB_SEARCH);
        assert_eq!(entries[0]["resultCount"], 1);
    }

    #[tokio::test]
    async fn news_search_sends_topic_and_days() {
        let server = MockServer::start().await;
        let provider = connected(&server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"topic": "news", "days": 3, "max_results": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider
            .execute_tool("n", NEWS_SEARCH, json!({"query": "launch", "days": 3, "max_results": 2}))
            .await;

        assert!(!result.is_error);
        assert!(result.to_message_content().starts_with("No results"));
    }

    #[tokio::test]
    async fn bad_arguments_never_reach_the_api() {
        let server = MockServer::start().await;
        let provider = connected(&server).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cases = [
            (WEB_SEARCH, json!({})),
            (WEB_SEARCH, json!({"query": "   "})),
            (WEB_SEARCH, json!({"query": "x".repeat(401)})),
            (WEB_SEARCH, json!({"query": "rust", "max_results": 21})),
            (WEB_SEARCH, json!({"query": "rust", "unexpected": true})),
            (NEWS_SEARCH, json!({"query": "rust", "days": 0})),
            ("image_search", json!({"query": "rust"})),
        ];

        for (name, args) in cases {
            let result = provider.execute_tool("c", name, args.clone()).await;
            assert!(result.is_error, "{name} {args}");
            assert!(!result.to_message_content().is_empty());
        }
    }

    #[tokio::test]
    async fn upstream_failure_is_an_error_result() {
        let server = MockServer::start().await;
        let provider = connected(&server).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = provider.execute_tool("c", WEB_SEARCH, json!({"query": "rust"})).await;
        assert!(result.is_error);
        assert!(result.to_message_content().contains("500"));

        let stats = provider.read_resource(STATS_URI).await.unwrap();
        let stats: serde_json::Value = serde_json::from_str(&stats.text).unwrap();
        assert_eq!(stats["searches"], 1);
        assert_eq!(stats["failures"], 1);
    }

    #[tokio::test]
    async fn history_is_bounded_and_cleared_on_disconnect() {
        let server = MockServer::start().await;
        let provider = connected(&server).await;
        mount_results(&server).await;

        for query in ["one", "two", "three"] {
            provider.execute_tool("c", WEB_SEARCH, json!({"query": query})).await;
        }

        let history = provider.read_resource(HISTORY_URI).await.unwrap();
        let entries: Vec<serde_json::Value> = serde_json::from_str(&history.text).unwrap();
        let queries: Vec<_> = entries.iter().map(|e| e["query"].as_str().unwrap()).collect();
        assert_eq!(queries, ["two", "three"]);

        provider.disconnect().await;
        assert_eq!(provider.state(), ProviderState::Disconnected);
        assert_eq!(provider.read_resource(HISTORY_URI).await.unwrap().text, "[]");

        let result = provider.execute_tool("c", WEB_SEARCH, json!({"query": "four"})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn health_check_does_not_touch_history() {
        let server = MockServer::start().await;
        let provider = connected(&server).await;

        let report = provider.health_check().await;
        assert!(report.healthy);
        assert_eq!(provider.read_resource(HISTORY_URI).await.unwrap().text, "[]");
    }

    #[tokio::test]
    async fn advertises_tools_and_resources() {
        let server = MockServer::start().await;
        let provider = SearchToolProvider::new("web", config(&server)).unwrap();

        let tools = provider.tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, [WEB_SEARCH, NEWS_SEARCH]);
        assert_eq!(tools[0].parameters["required"], json!(["query"]));

        let resources = provider.resources().await.unwrap();
        assert_eq!(resources.len(), 2);

        let err = provider.read_resource("search://nope").await.unwrap_err();
        assert!(matches!(err, ToolError::ResourceNotFound { .. }));
    }
}
