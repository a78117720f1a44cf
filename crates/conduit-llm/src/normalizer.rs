//! Folds provider stream events into [`CompletionChunk`]s
//!
//! Every stream gets one id. The finish reason is held back until the
//! upstream ends so that the terminal chunk is always last and carries any
//! usage reported after the finish reason.

use futures_util::StreamExt;

use crate::error::ProviderError;
use crate::tokens::estimate_tokens;
use crate::types::{
    ChunkDelta, ChunkStream, CompletionChunk, EventStream, FinishReason, Role, StreamEvent, Usage, unix_now,
};

/// Context needed to label chunks and estimate missing usage
#[derive(Debug, Clone)]
pub struct StreamMeta {
    /// Requested model, replaced if the upstream announces another
    pub model: String,
    pub prompt_tokens: u32,
    pub token_width: f64,
}

/// Turn raw provider events into a normalized chunk stream
///
/// Dropping the returned stream drops `events` and with it the response body.
pub fn normalize(events: EventStream, meta: StreamMeta) -> ChunkStream {
    let normalizer = Normalizer {
        events: Some(events),
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        created: unix_now(),
        model: meta.model,
        prompt_tokens: meta.prompt_tokens,
        token_width: meta.token_width,
        completion: String::new(),
        role_sent: false,
        finish: None,
        usage: None,
    };

    Box::pin(futures_util::stream::unfold(normalizer, |mut n| async move {
        let item = n.next().await?;
        Some((item, n))
    }))
}

struct Normalizer {
    /// `None` once the stream has ended
    events: Option<EventStream>,
    id: String,
    created: u64,
    model: String,
    prompt_tokens: u32,
    token_width: f64,
    /// Emitted text, kept for usage estimates
    completion: String,
    role_sent: bool,
    finish: Option<FinishReason>,
    usage: Option<Usage>,
}

impl Normalizer {
    async fn next(&mut self) -> Option<Result<CompletionChunk, ProviderError>> {
        loop {
            let event = self.events.as_mut()?.next().await;

            match event {
                Some(Ok(StreamEvent::Model(model))) => {
                    if !model.is_empty() {
                        self.model = model;
                    }
                }
                Some(Ok(StreamEvent::Text(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    self.completion.push_str(&text);

                    let delta = ChunkDelta {
                        content: Some(text),
                        ..ChunkDelta::default()
                    };
                    return Some(Ok(self.chunk(delta, None, None)));
                }
                Some(Ok(StreamEvent::ToolCall(call))) => {
                    if let Some(name) = &call.name {
                        self.completion.push_str(name);
                    }
                    if let Some(arguments) = &call.arguments {
                        self.completion.push_str(arguments);
                    }

                    let delta = ChunkDelta {
                        tool_calls: vec![call],
                        ..ChunkDelta::default()
                    };
                    return Some(Ok(self.chunk(delta, None, None)));
                }
                Some(Ok(StreamEvent::Finish(reason))) => self.finish = Some(reason),
                Some(Ok(StreamEvent::Usage(usage))) => self.usage = Some(usage),
                Some(Ok(StreamEvent::Done)) => {
                    return Some(Ok(self.terminal(self.finish.unwrap_or(FinishReason::Stop))));
                }
                Some(Err(error)) => {
                    self.events = None;
                    return Some(Err(error));
                }
                None => {
                    return Some(match self.finish {
                        Some(reason) => Ok(self.terminal(reason)),
                        None => {
                            self.events = None;
                            Err(ProviderError::transient("upstream stream ended before a finish reason"))
                        }
                    });
                }
            }
        }
    }

    fn terminal(&mut self, reason: FinishReason) -> CompletionChunk {
        self.events = None;

        let usage = self.usage.unwrap_or_else(|| {
            Usage::estimate(self.prompt_tokens, estimate_tokens(&self.completion, self.token_width))
        });

        self.chunk(ChunkDelta::default(), Some(reason), Some(usage))
    }

    fn chunk(&mut self, mut delta: ChunkDelta, finish_reason: Option<FinishReason>, usage: Option<Usage>) -> CompletionChunk {
        if !self.role_sent {
            self.role_sent = true;
            delta.role = Some(Role::Assistant);
        }

        CompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_owned(),
            created: self.created,
            model: self.model.clone(),
            delta,
            finish_reason,
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::error::ErrorKind;
    use crate::types::ToolCallDelta;

    fn meta() -> StreamMeta {
        StreamMeta {
            model: "requested".to_owned(),
            prompt_tokens: 3,
            token_width: 4.0,
        }
    }

    fn events(items: Vec<Result<StreamEvent, ProviderError>>) -> EventStream {
        Box::pin(stream::iter(items))
    }

    async fn collect(items: Vec<Result<StreamEvent, ProviderError>>) -> Vec<Result<CompletionChunk, ProviderError>> {
        normalize(events(items), meta()).collect().await
    }

    #[tokio::test]
    async fn exactly_one_terminal_chunk_and_it_is_last() {
        let chunks = collect(vec![
            Ok(StreamEvent::Model("gpt-4o-2024".into())),
            Ok(StreamEvent::Text("2+2".into())),
            Ok(StreamEvent::Finish(FinishReason::Stop)),
            Ok(StreamEvent::Text(" is 4".into())),
            Ok(StreamEvent::Usage(Usage::new(7, 3))),
            Ok(StreamEvent::Done),
            Ok(StreamEvent::Text("ignored".into())),
        ])
        .await;

        let chunks: Vec<_> = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().filter(|c| c.is_terminal()).count(), 1);

        let last = chunks.last().unwrap();
        assert_eq!(last.finish_reason, Some(FinishReason::Stop));
        assert_eq!(last.usage, Some(Usage::new(7, 3)));

        assert!(chunks.iter().all(|c| c.id == chunks[0].id && c.model == "gpt-4o-2024"));
        assert_eq!(chunks[0].delta.role, Some(Role::Assistant));
        assert_eq!(chunks[1].delta.role, None);
    }

    #[tokio::test]
    async fn eof_after_finish_emits_terminal_with_estimated_usage() {
        let chunks = collect(vec![
            Ok(StreamEvent::ToolCall(ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("web_search".into()),
                arguments: Some("{}".into()),
            })),
            Ok(StreamEvent::Finish(FinishReason::ToolCalls)),
        ])
        .await;

        let last = chunks.last().unwrap().as_ref().unwrap();
        assert_eq!(last.finish_reason, Some(FinishReason::ToolCalls));

        let usage = last.usage.unwrap();
        assert!(usage.estimated);
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 3);
    }

    #[tokio::test]
    async fn done_without_finish_defaults_to_stop() {
        let chunks = collect(vec![Ok(StreamEvent::Done)]).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error_not_a_fake_terminal() {
        let chunks = collect(vec![Ok(StreamEvent::Text("partial".into()))]).await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert_eq!(chunks[1].as_ref().unwrap_err().kind(), ErrorKind::TransientNetwork);
    }

    #[tokio::test]
    async fn upstream_error_ends_the_stream() {
        let chunks = collect(vec![
            Err(ProviderError::transient("overloaded")),
            Ok(StreamEvent::Text("never".into())),
        ])
        .await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_err());
    }
}
