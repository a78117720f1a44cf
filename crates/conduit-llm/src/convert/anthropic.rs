use super::{encode_arguments, parse_arguments};
use crate::error::ProviderError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicMessage, AnthropicMessageDelta, AnthropicRequest, AnthropicResponse,
    AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicTool,
    AnthropicToolChoice, AnthropicUsage,
};
use crate::types::{
    Choice, ChoiceMessage, CompletionRequest, CompletionResponse, FinishReason, Message, Role, StreamEvent, ToolCall,
    ToolCallDelta, ToolChoice, ToolChoiceMode, Usage,
};

/// Output budget sent when the caller sets none; the API requires one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

impl From<&CompletionRequest> for AnthropicRequest {
    fn from(req: &CompletionRequest) -> Self {
        if req.params.frequency_penalty.is_some() || req.params.presence_penalty.is_some() {
            tracing::debug!(model = %req.model, "dropping penalties, unsupported by the messages protocol");
        }

        let mut system = None;
        let mut messages: Vec<AnthropicMessage> = Vec::new();

        for msg in &req.messages {
            if msg.role == Role::System {
                system = Some(msg.content.clone());
                continue;
            }

            let role = if msg.role == Role::Assistant { "assistant" } else { "user" };
            let blocks = message_blocks(msg);

            // Consecutive tool results must share a single user turn
            match messages.last_mut() {
                Some(last) if msg.role == Role::Tool && last.role == "user" && is_tool_result_turn(last) => {
                    last.content.extend(blocks);
                }
                _ => messages.push(AnthropicMessage {
                    role: role.to_owned(),
                    content: blocks,
                }),
            }
        }

        let tools = (!req.tools.is_empty()).then(|| {
            req.tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                })
                .collect()
        });

        Self {
            model: req.model.clone(),
            max_tokens: req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            top_k: req.params.top_k,
            stop_sequences: req.params.stop.clone(),
            stream: req.stream.then_some(true),
            tools,
            tool_choice: req.tool_choice.as_ref().and_then(tool_choice),
        }
    }
}

fn is_tool_result_turn(message: &AnthropicMessage) -> bool {
    message
        .content
        .iter()
        .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. }))
}

fn message_blocks(msg: &Message) -> Vec<AnthropicContentBlock> {
    if msg.role == Role::Tool {
        return vec![AnthropicContentBlock::ToolResult {
            tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
            content: msg.content.clone(),
            is_error: msg.is_error,
        }];
    }

    let mut blocks = Vec::with_capacity(1 + msg.tool_calls.len());

    if !msg.content.is_empty() {
        blocks.push(AnthropicContentBlock::Text {
            text: msg.content.clone(),
        });
    }

    for call in &msg.tool_calls {
        blocks.push(AnthropicContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input: parse_arguments(&call.function.arguments),
        });
    }

    blocks
}

/// Anthropic has no "none" mode; omitting the field leaves tool use to the model
fn tool_choice(choice: &ToolChoice) -> Option<AnthropicToolChoice> {
    let (choice_type, name) = match choice {
        ToolChoice::Mode(ToolChoiceMode::None) => return None,
        ToolChoice::Mode(ToolChoiceMode::Auto) => ("auto", None),
        ToolChoice::Mode(ToolChoiceMode::Required) => ("any", None),
        ToolChoice::Function(f) => ("tool", Some(f.function.name.clone())),
    };

    Some(AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    })
}

impl From<AnthropicResponse> for CompletionResponse {
    fn from(resp: AnthropicResponse) -> Self {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                AnthropicResponseBlock::Text { text: t } => text.push_str(&t),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, encode_arguments(&input)));
                }
                AnthropicResponseBlock::Other => {}
            }
        }

        let choice = Choice {
            index: 0,
            message: ChoiceMessage::assistant(text, tool_calls),
            finish_reason: resp.stop_reason.as_deref().map(parse_stop_reason),
        };

        let usage = resp.usage.map(|u| Usage::new(u.input_tokens, u.output_tokens));

        Self::new(resp.id, resp.model, vec![choice], usage)
    }
}

fn parse_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Folds Anthropic's block-oriented SSE events into stream events
///
/// Content block indices are shared between text and tool blocks, so tool
/// calls get their own sequential index.
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    input_tokens: u32,
    next_tool_index: u32,
    current_tool_index: Option<u32>,
}

impl AnthropicStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_event(&mut self, event: AnthropicStreamEvent) -> Vec<Result<StreamEvent, ProviderError>> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.input_tokens = message.usage.map_or(0, |u| u.input_tokens);
                vec![Ok(StreamEvent::Model(message.model))]
            }

            AnthropicStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                AnthropicStreamContentBlock::Text { text } if !text.is_empty() => vec![Ok(StreamEvent::Text(text))],
                AnthropicStreamContentBlock::ToolUse { id, name } => {
                    let index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.current_tool_index = Some(index);

                    vec![Ok(StreamEvent::ToolCall(ToolCallDelta {
                        index,
                        id: Some(id),
                        name: Some(name),
                        arguments: None,
                    }))]
                }
                _ => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![Ok(StreamEvent::Text(text))],
                AnthropicStreamDelta::InputJsonDelta { partial_json } => match self.current_tool_index {
                    Some(index) => vec![Ok(StreamEvent::ToolCall(ToolCallDelta {
                        index,
                        id: None,
                        name: None,
                        arguments: Some(partial_json),
                    }))],
                    None => Vec::new(),
                },
                AnthropicStreamDelta::Other => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockStop { .. } => {
                self.current_tool_index = None;
                Vec::new()
            }

            AnthropicStreamEvent::MessageDelta { delta, usage } => self.message_delta(&delta, usage),

            AnthropicStreamEvent::MessageStop => vec![Ok(StreamEvent::Done)],

            AnthropicStreamEvent::Ping => Vec::new(),

            AnthropicStreamEvent::Error { error } => {
                let err = if error.error_type == "overloaded_error" || error.error_type == "api_error" {
                    ProviderError::transient(error.message)
                } else {
                    ProviderError::unknown(error.message)
                };
                vec![Err(err)]
            }
        }
    }

    fn message_delta(
        &self,
        delta: &AnthropicMessageDelta,
        usage: Option<AnthropicUsage>,
    ) -> Vec<Result<StreamEvent, ProviderError>> {
        let mut events = Vec::new();

        if let Some(reason) = delta.stop_reason.as_deref() {
            events.push(Ok(StreamEvent::Finish(parse_stop_reason(reason))));
        }

        if let Some(usage) = usage {
            let input = if usage.input_tokens > 0 {
                usage.input_tokens
            } else {
                self.input_tokens
            };
            events.push(Ok(StreamEvent::Usage(Usage::new(input, usage.output_tokens))));
        }

        events
    }
}
