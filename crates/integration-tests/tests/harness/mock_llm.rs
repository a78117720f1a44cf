//! Mock LLM backend for integration tests
//!
//! Speaks the `OpenAI` chat completions protocol and replays scripted replies

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::stream;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const DEFAULT_REPLY: &str = "Hello from mock LLM";

/// Canned assistant turn
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// `(id, name, arguments)` per call
    ToolCalls(Vec<(String, String, Value)>),
}

impl Reply {
    pub fn text(content: &str) -> Self {
        Self::Text(content.to_owned())
    }

    pub fn tool_calls(calls: &[(&str, &str, Value)]) -> Self {
        Self::ToolCalls(
            calls
                .iter()
                .map(|(id, name, args)| ((*id).to_owned(), (*name).to_owned(), args.clone()))
                .collect(),
        )
    }
}

/// Mock LLM backend returning predictable responses
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    completion_count: AtomicU32,
    /// Number of requests to fail with 500 before succeeding
    fail_count: AtomicU32,
    include_usage: bool,
    default_reply: String,
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Value>>,
    /// Pause between SSE frames; `None` sends the whole body at once
    frame_delay: Option<Duration>,
    frames_sent: AtomicU32,
    /// Set once the server dropped a streaming body
    stream_closed: AtomicBool,
}

/// Options of a [`MockLlm`] before it starts
pub struct MockLlmBuilder {
    fail_count: u32,
    include_usage: bool,
    default_reply: String,
    script: VecDeque<Reply>,
    frame_delay: Option<Duration>,
}

impl MockLlmBuilder {
    /// Queue a reply; once the script runs out the default reply is used
    pub fn reply(mut self, reply: Reply) -> Self {
        self.script.push_back(reply);
        self
    }

    pub fn default_reply(mut self, content: &str) -> Self {
        content.clone_into(&mut self.default_reply);
        self
    }

    /// Fail the first `n` completion requests with 500
    pub const fn fail_first(mut self, n: u32) -> Self {
        self.fail_count = n;
        self
    }

    /// Send streaming frames one by one with `delay` in between
    pub const fn slow_stream(mut self, delay: Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }

    /// Leave `usage` out of every response
    pub const fn without_usage(mut self) -> Self {
        self.include_usage = false;
        self
    }

    pub async fn start(self) -> anyhow::Result<MockLlm> {
        let state = Arc::new(MockLlmState {
            completion_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(self.fail_count),
            include_usage: self.include_usage,
            default_reply: self.default_reply,
            script: Mutex::new(self.script),
            requests: Mutex::new(Vec::new()),
            frame_delay: self.frame_delay,
            frames_sent: AtomicU32::new(0),
            stream_closed: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/models", routing::get(handle_models))
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

        Ok(MockLlm { addr, shutdown, state })
    }
}

impl MockLlm {
    pub fn builder() -> MockLlmBuilder {
        MockLlmBuilder {
            fail_count: 0,
            include_usage: true,
            default_reply: DEFAULT_REPLY.to_owned(),
            script: VecDeque::new(),
            frame_delay: None,
        }
    }

    /// Start a mock that always answers with the default reply
    pub async fn start() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    /// Base URL for configuring the mock as a provider
    ///
    /// Includes `/v1` since the client appends paths like `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of completion requests received, failed ones included
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Bodies of every completion request, in arrival order
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    /// SSE frames written by slow streams so far
    pub fn frames_sent(&self) -> u32 {
        self.state.frames_sent.load(Ordering::SeqCst)
    }

    /// Whether a slow stream's body was dropped, by completion or disconnect
    pub fn stream_closed(&self) -> bool {
        self.state.stream_closed.load(Ordering::SeqCst)
    }

    /// Tool-role messages of the `n`th request as `(tool_call_id, content)`
    pub fn tool_messages(&self, n: usize) -> Vec<(String, String)> {
        self.requests()[n]["messages"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|m| m["role"] == "tool")
            .map(|m| {
                (
                    m["tool_call_id"].as_str().unwrap_or_default().to_owned(),
                    m["content"].as_str().unwrap_or_default().to_owned(),
                )
            })
            .collect()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_chat_completions(State(state): State<Arc<MockLlmState>>, Json(body): Json<Value>) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    state.requests.lock().unwrap().push(body.clone());

    let remaining = state.fail_count.load(Ordering::Relaxed);
    if remaining > 0 {
        state.fail_count.fetch_sub(1, Ordering::Relaxed);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": {
                    "message": "mock server intentional failure",
                    "type": "server_error"
                }
            })),
        )
            .into_response();
    }

    let model = body["model"].as_str().unwrap_or("mock-model-1").to_owned();
    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::Text(state.default_reply.clone()));

    if body["stream"].as_bool().unwrap_or(false) {
        let frames = stream_frames(&model, &reply, state.include_usage);
        return streaming_response(&state, frames);
    }

    let (message, finish_reason) = match &reply {
        Reply::Text(content) => (json!({ "role": "assistant", "content": content }), "stop"),
        Reply::ToolCalls(calls) => (
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": calls.iter().map(|(id, name, args)| json!({
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": args.to_string() }
                })).collect::<Vec<_>>()
            }),
            "tool_calls",
        ),
    };

    let mut response = json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{ "index": 0, "message": message, "finish_reason": finish_reason }]
    });

    if state.include_usage {
        response["usage"] = json!({ "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 });
    }

    Json(response).into_response()
}

/// Marks the stream closed when the server drops the body
struct CloseGuard(Arc<MockLlmState>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.stream_closed.store(true, Ordering::SeqCst);
    }
}

fn streaming_response(state: &Arc<MockLlmState>, frames: Vec<String>) -> Response {
    let body = match state.frame_delay {
        None => Body::from(frames.concat()),
        Some(delay) => {
            let guard = CloseGuard(Arc::clone(state));
            let frames = stream::unfold((frames.into_iter(), guard), move |(mut frames, guard)| async move {
                let frame = frames.next()?;
                tokio::time::sleep(delay).await;
                guard.0.frames_sent.fetch_add(1, Ordering::SeqCst);
                Some((Ok::<_, Infallible>(frame), (frames, guard)))
            });
            Body::from_stream(frames)
        }
    };

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}

/// SSE frames: role, one chunk per word, finish reason, usage, `[DONE]`
fn stream_frames(model: &str, reply: &Reply, include_usage: bool) -> Vec<String> {
    let chunk = |delta: Value, finish_reason: Option<&str>| {
        let chunk = json!({
            "id": "chatcmpl-test-stream",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": model,
            "choices": [{ "index": 0, "delta": delta, "finish_reason": finish_reason }]
        });
        format!("data: {chunk}\n\n")
    };

    let mut frames = vec![chunk(json!({ "role": "assistant", "content": "" }), None)];

    match reply {
        Reply::Text(content) => {
            for (i, word) in content.split(' ').enumerate() {
                let piece = if i == 0 { word.to_owned() } else { format!(" {word}") };
                frames.push(chunk(json!({ "content": piece }), None));
            }
            frames.push(chunk(json!({}), Some("stop")));
        }
        Reply::ToolCalls(calls) => {
            for (index, (id, name, args)) in calls.iter().enumerate() {
                frames.push(chunk(
                    json!({ "tool_calls": [{
                        "index": index,
                        "id": id,
                        "type": "function",
                        "function": { "name": name, "arguments": args.to_string() }
                    }]}),
                    None,
                ));
            }
            frames.push(chunk(json!({}), Some("tool_calls")));
        }
    }

    if include_usage {
        let usage = json!({
            "id": "chatcmpl-test-stream",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": model,
            "choices": [],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        frames.push(format!("data: {usage}\n\n"));
    }

    frames.push("data: [DONE]\n\n".to_owned());
    frames
}

async fn handle_models() -> impl IntoResponse {
    Json(json!({
        "object": "list",
        "data": [{ "id": "mock-model-1", "object": "model", "created": 1_700_000_000, "owned_by": "mock" }]
    }))
}
