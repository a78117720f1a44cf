//! Axum route handlers exposing the gateway over HTTP

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use conduit_llm::{ChunkStream, CompletionRequest, ProviderError, ProviderId};
use futures_util::{Stream, StreamExt, stream};
use serde::Deserialize;

use crate::error::tool_error;
use crate::gateway::Gateway;
use crate::injection::ToolOptions;

/// Body of `POST /v1/chat/completions`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(flatten)]
    pub request: CompletionRequest,
    /// Upstream provider; the configured default when absent
    #[serde(default)]
    pub provider: Option<ProviderId>,
    /// Tool providers to offer; every auto-injected provider when absent
    #[serde(default)]
    pub tool_providers: Option<Vec<String>>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Build the router serving every gateway endpoint
pub fn gateway_router(gateway: Arc<Gateway>, health_path: &str) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/tools", routing::get(list_tools))
        .route("/v1/tools/health", routing::get(tools_health))
        .route("/v1/tools/providers/{id}", routing::delete(unregister_tool_provider))
        .route(
            "/v1/conversations/{id}/history",
            routing::get(conversation_history).delete(clear_conversation_history),
        )
        .route("/v1/providers/{id}/health", routing::get(provider_health))
        .route(health_path, routing::get(health))
        .with_state(gateway)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(State(gateway): State<Arc<Gateway>>, Json(body): Json<ChatRequest>) -> Response {
    let ChatRequest {
        request,
        provider,
        tool_providers,
        conversation_id,
    } = body;

    if request.stream {
        return match gateway.stream(provider, &request).await {
            Ok(chunks) => stream_response(chunks).into_response(),
            Err(e) => error_response(&e),
        };
    }

    let options = ToolOptions {
        enabled_providers: tool_providers,
        conversation_id,
    };

    match gateway.complete_with_tools(provider, request, &options).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Build a streaming SSE response of completion chunks, ending with `[DONE]`
fn stream_response(chunks: ChunkStream) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = chunks
        .map(|result| match result {
            Ok(chunk) => {
                let data = serde_json::to_string(&chunk).unwrap_or_default();
                Ok(Event::default().data(data))
            }
            Err(e) => {
                tracing::warn!(error = %e, "stream ended with an upstream error");
                let error_data = serde_json::json!({
                    "error": {
                        "message": e.message(),
                        "type": "streaming_error",
                        "code": e.kind(),
                    }
                });
                Ok(Event::default().data(error_data.to_string()))
            }
        })
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Handle `GET /v1/tools`
async fn list_tools(State(gateway): State<Arc<Gateway>>) -> Response {
    Json(gateway.list_tools().await).into_response()
}

/// Handle `GET /v1/tools/health`
async fn tools_health(State(gateway): State<Arc<Gateway>>) -> Response {
    Json(gateway.health_check_all().await).into_response()
}

/// Handle `DELETE /v1/tools/providers/{id}`
async fn unregister_tool_provider(State(gateway): State<Arc<Gateway>>, Path(id): Path<String>) -> Response {
    match gateway.unregister_tool_provider(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&tool_error(&e)),
    }
}

/// Handle `GET /v1/conversations/{id}/history`
async fn conversation_history(State(gateway): State<Arc<Gateway>>, Path(id): Path<String>) -> Response {
    Json(gateway.history(&id)).into_response()
}

/// Handle `DELETE /v1/conversations/{id}/history`
async fn clear_conversation_history(State(gateway): State<Arc<Gateway>>, Path(id): Path<String>) -> Response {
    if gateway.clear_history(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(&ProviderError::not_found(format!("no history for conversation: {id}")))
    }
}

/// Handle `GET /v1/providers/{id}/health`
async fn provider_health(State(gateway): State<Arc<Gateway>>, Path(id): Path<String>) -> Response {
    let Ok(provider) = ProviderId::from_str(&id) else {
        return error_response(&ProviderError::not_found(format!("unknown provider: {id}")));
    };

    match gateway.provider_health(provider).await {
        Ok(health) if health.state == conduit_llm::HealthState::Healthy => Json(health).into_response(),
        Ok(health) => (StatusCode::SERVICE_UNAVAILABLE, Json(health)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Convert a gateway error to an `OpenAI`-style JSON error response
fn error_response(error: &ProviderError) -> Response {
    let body = serde_json::json!({
        "error": {
            "message": error.message(),
            "type": error.error_type(),
            "code": error.kind(),
        }
    });

    (error.status_code(), Json(body)).into_response()
}
