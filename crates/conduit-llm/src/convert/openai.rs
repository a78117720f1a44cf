use crate::protocol::openai::{
    OpenAiChoice, OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk,
    OpenAiStreamOptions, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    Choice, ChoiceMessage, CompletionRequest, CompletionResponse, FinishReason, Message, StreamEvent, ToolCall,
    ToolCallDelta, ToolChoice, ToolChoiceMode, Usage,
};

impl From<&CompletionRequest> for OpenAiRequest {
    fn from(req: &CompletionRequest) -> Self {
        if req.params.top_k.is_some() {
            tracing::debug!(model = %req.model, "dropping top_k, unsupported by the chat completions protocol");
        }

        let tools = (!req.tools.is_empty()).then(|| {
            req.tools
                .iter()
                .map(|t| OpenAiTool {
                    tool_type: "function".to_owned(),
                    function: OpenAiFunction {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    },
                })
                .collect()
        });

        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_tokens: req.params.max_tokens,
            stop: req.params.stop.clone(),
            frequency_penalty: req.params.frequency_penalty,
            presence_penalty: req.params.presence_penalty,
            stream: req.stream.then_some(true),
            stream_options: None,
            tools,
            tool_choice: req.tool_choice.as_ref().map(tool_choice_value),
        }
    }
}

impl OpenAiRequest {
    /// Mark the request as streaming, optionally asking for a trailing usage chunk
    pub(crate) fn streaming(mut self, include_usage: bool) -> Self {
        self.stream = Some(true);
        self.stream_options = include_usage.then_some(OpenAiStreamOptions { include_usage: true });
        self
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
            msg.tool_calls
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.id.clone(),
                    tool_type: "function".to_owned(),
                    function: OpenAiFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect()
        });

        // Assistant turns that only call tools are sent with null content
        let content = if msg.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(msg.content.clone())
        };

        Self {
            role: msg.role.to_string(),
            content,
            name: None,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

fn tool_choice_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Mode(ToolChoiceMode::None) => "none".into(),
        ToolChoice::Mode(ToolChoiceMode::Auto) => "auto".into(),
        ToolChoice::Mode(ToolChoiceMode::Required) => "required".into(),
        ToolChoice::Function(f) => serde_json::json!({
            "type": "function",
            "function": { "name": f.function.name },
        }),
    }
}

impl From<OpenAiResponse> for CompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        let choices = resp.choices.into_iter().map(Into::into).collect();
        let id = if resp.id.is_empty() {
            format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
        } else {
            resp.id
        };

        Self::new(id, resp.model, choices, resp.usage.map(Into::into))
    }
}

impl From<OpenAiChoice> for Choice {
    fn from(choice: OpenAiChoice) -> Self {
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        Self {
            index: choice.index,
            message: ChoiceMessage::assistant(choice.message.content.unwrap_or_default(), tool_calls),
            finish_reason: choice.finish_reason.as_deref().map(parse_finish_reason),
        }
    }
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            total_tokens: usage.total_tokens.max(usage.prompt_tokens + usage.completion_tokens),
            ..Self::new(usage.prompt_tokens, usage.completion_tokens)
        }
    }
}

/// Decode one streaming chunk into stream events
pub fn chunk_events(chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if !chunk.model.is_empty() {
        events.push(StreamEvent::Model(chunk.model));
    }

    // Only the first choice is streamed to callers
    if let Some(choice) = chunk.choices.into_iter().find(|c| c.index == 0) {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::Text(text));
        }

        for call in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = call.function.map_or((None, None), |f| (f.name, f.arguments));
            events.push(StreamEvent::ToolCall(ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            }));
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            events.push(StreamEvent::Finish(parse_finish_reason(reason)));
        }
    }

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage.into()));
    }

    events
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}
