//! Mock web search service for integration tests
//!
//! Answers `POST /search` with one hit per query. Queries can be delayed or
//! made to fail to exercise ordering and error handling.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub struct MockSearch {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockSearchState>,
}

struct MockSearchState {
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    /// Queries in the order their responses were sent
    completed: Mutex<Vec<String>>,
}

impl MockSearch {
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(HashMap::new(), Vec::new()).await
    }

    /// Delay the response to each listed query by the given milliseconds
    pub async fn start_with_delays(delays: &[(&str, u64)]) -> anyhow::Result<Self> {
        let delays = delays
            .iter()
            .map(|(query, ms)| ((*query).to_owned(), Duration::from_millis(*ms)))
            .collect();
        Self::start_inner(delays, Vec::new()).await
    }

    /// Answer the listed queries with 500
    pub async fn start_failing(queries: &[&str]) -> anyhow::Result<Self> {
        Self::start_inner(HashMap::new(), queries.iter().map(|&q| q.to_owned()).collect()).await
    }

    async fn start_inner(delays: HashMap<String, Duration>, failing: Vec<String>) -> anyhow::Result<Self> {
        let state = Arc::new(MockSearchState {
            delays,
            failing,
            completed: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/search", routing::get(handle_probe).post(handle_search))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// URL to configure as the search provider's endpoint
    pub fn endpoint(&self) -> String {
        format!("http://{}/search", self.addr)
    }

    /// Queries in the order they finished
    pub fn completed(&self) -> Vec<String> {
        self.state.completed.lock().unwrap().clone()
    }
}

impl Drop for MockSearch {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_probe() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn handle_search(State(state): State<Arc<MockSearchState>>, Json(body): Json<Value>) -> Response {
    let query = body["query"].as_str().unwrap_or_default().to_owned();

    if let Some(delay) = state.delays.get(&query) {
        tokio::time::sleep(*delay).await;
    }

    state.completed.lock().unwrap().push(query.clone());

    if state.failing.contains(&query) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "index unavailable" })),
        )
            .into_response();
    }

    Json(json!({
        "answer": null,
        "results": [{
            "title": format!("Result for {query}"),
            "url": format!("https://example.com/{}", query.replace(' ', "-")),
            "content": format!("Everything about {query}")
        }]
    }))
    .into_response()
}
