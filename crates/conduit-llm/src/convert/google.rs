use super::{encode_arguments, parse_arguments};
use crate::protocol::google::{
    GoogleCandidate, GoogleContent, GoogleFunctionCall, GoogleFunctionCallingConfig, GoogleFunctionDeclaration,
    GoogleFunctionResponse, GoogleGenerationConfig, GooglePart, GoogleRequest, GoogleResponse, GoogleTool,
    GoogleToolConfig, GoogleUsageMetadata,
};
use crate::types::{
    Choice, ChoiceMessage, CompletionRequest, CompletionResponse, FinishReason, Message, Role, StreamEvent, ToolCall,
    ToolCallDelta, ToolChoice, ToolChoiceMode, Usage,
};

impl From<&CompletionRequest> for GoogleRequest {
    fn from(req: &CompletionRequest) -> Self {
        let mut system_instruction = None;
        let mut contents: Vec<GoogleContent> = Vec::new();

        for msg in &req.messages {
            let (role, parts) = match msg.role {
                Role::System => {
                    system_instruction = Some(GoogleContent {
                        role: None,
                        parts: vec![GooglePart::Text(msg.content.clone())],
                    });
                    continue;
                }
                Role::User => ("user", vec![GooglePart::Text(msg.content.clone())]),
                Role::Assistant => ("model", model_parts(msg)),
                Role::Tool => ("user", vec![function_response(msg)]),
            };

            // Responses to parallel calls travel together in one user turn
            match contents.last_mut() {
                Some(last) if msg.role == Role::Tool && is_function_response_turn(last) => last.parts.extend(parts),
                _ => contents.push(GoogleContent {
                    role: Some(role.to_owned()),
                    parts,
                }),
            }
        }

        let params = &req.params;
        let generation_config = GoogleGenerationConfig {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            max_output_tokens: params.max_tokens,
            stop_sequences: params.stop.clone(),
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        };

        let tools = (!req.tools.is_empty()).then(|| {
            vec![GoogleTool {
                function_declarations: req
                    .tools
                    .iter()
                    .map(|t| GoogleFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        let tool_config = req.tool_choice.as_ref().map(|choice| {
            let (mode, allowed) = match choice {
                ToolChoice::Mode(ToolChoiceMode::None) => ("NONE", None),
                ToolChoice::Mode(ToolChoiceMode::Auto) => ("AUTO", None),
                ToolChoice::Mode(ToolChoiceMode::Required) => ("ANY", None),
                ToolChoice::Function(f) => ("ANY", Some(vec![f.function.name.clone()])),
            };

            GoogleToolConfig {
                function_calling_config: GoogleFunctionCallingConfig {
                    mode: mode.to_owned(),
                    allowed_function_names: allowed,
                },
            }
        });

        Self {
            contents,
            system_instruction,
            generation_config: Some(generation_config),
            tools,
            tool_config,
        }
    }
}

fn model_parts(msg: &Message) -> Vec<GooglePart> {
    let mut parts = Vec::new();

    if !msg.content.is_empty() {
        parts.push(GooglePart::Text(msg.content.clone()));
    }

    for call in &msg.tool_calls {
        parts.push(GooglePart::FunctionCall(GoogleFunctionCall {
            name: call.function.name.clone(),
            args: parse_arguments(&call.function.arguments),
        }));
    }

    if parts.is_empty() {
        parts.push(GooglePart::Text(String::new()));
    }

    parts
}

/// Google matches responses to calls by function name and wants an object payload
fn function_response(msg: &Message) -> GooglePart {
    let name = msg
        .name
        .clone()
        .or_else(|| msg.tool_call_id.clone())
        .unwrap_or_default();

    if msg.is_error {
        let response = serde_json::json!({ "error": msg.content });
        return GooglePart::FunctionResponse(GoogleFunctionResponse { name, response });
    }

    let response = match serde_json::from_str::<serde_json::Value>(&msg.content) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(other) => serde_json::json!({ "result": other }),
        Err(_) => serde_json::json!({ "result": msg.content }),
    };

    GooglePart::FunctionResponse(GoogleFunctionResponse { name, response })
}

fn is_function_response_turn(content: &GoogleContent) -> bool {
    content.role.as_deref() == Some("user")
        && !content.parts.is_empty()
        && content
            .parts
            .iter()
            .all(|p| matches!(p, GooglePart::FunctionResponse(_)))
}

impl From<GoogleResponse> for CompletionResponse {
    fn from(resp: GoogleResponse) -> Self {
        let choices = resp
            .candidates
            .into_iter()
            .zip(0u32..)
            .map(|(candidate, i)| candidate_to_choice(candidate, i))
            .collect();

        let id = resp
            .response_id
            .unwrap_or_else(|| format!("gen-{}", uuid::Uuid::new_v4().simple()));

        Self::new(
            id,
            resp.model_version.unwrap_or_default(),
            choices,
            resp.usage_metadata.map(Into::into),
        )
    }
}

impl From<GoogleUsageMetadata> for Usage {
    fn from(usage: GoogleUsageMetadata) -> Self {
        Self {
            total_tokens: usage
                .total_token_count
                .max(usage.prompt_token_count.saturating_add(usage.candidates_token_count)),
            ..Self::new(usage.prompt_token_count, usage.candidates_token_count)
        }
    }
}

fn candidate_to_choice(candidate: GoogleCandidate, default_index: u32) -> Choice {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in candidate.content.parts {
        match part {
            GooglePart::Text(t) => text.push_str(&t),
            GooglePart::FunctionCall(call) => {
                tool_calls.push(ToolCall::new(call_id(), call.name, encode_arguments(&call.args)));
            }
            GooglePart::FunctionResponse(_) => {}
        }
    }

    let finish_reason = candidate
        .finish_reason
        .as_deref()
        .map(|reason| parse_finish_reason(reason, !tool_calls.is_empty()));

    Choice {
        index: candidate.index.unwrap_or(default_index),
        message: ChoiceMessage::assistant(text, tool_calls),
        finish_reason,
    }
}

/// Google reports `STOP` even when the model called functions
fn parse_finish_reason(reason: &str, has_tool_calls: bool) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => FinishReason::ContentFilter,
        _ if has_tool_calls => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Google function calls carry no id, so one is minted per call
fn call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Tracks tool call numbering across SSE messages
#[derive(Debug, Default)]
pub struct GoogleStreamState {
    next_tool_index: u32,
    saw_tool_call: bool,
}

impl GoogleStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one streamed `generateContent` response into stream events
    pub fn convert_chunk(&mut self, chunk: GoogleResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(model) = chunk.model_version {
            events.push(StreamEvent::Model(model));
        }

        if let Some(candidate) = chunk.candidates.into_iter().next() {
            for part in candidate.content.parts {
                match part {
                    GooglePart::Text(text) if !text.is_empty() => events.push(StreamEvent::Text(text)),
                    GooglePart::FunctionCall(call) => {
                        let index = self.next_tool_index;
                        self.next_tool_index += 1;
                        self.saw_tool_call = true;

                        events.push(StreamEvent::ToolCall(ToolCallDelta {
                            index,
                            id: Some(call_id()),
                            name: Some(call.name),
                            arguments: Some(encode_arguments(&call.args)),
                        }));
                    }
                    _ => {}
                }
            }

            if let Some(reason) = candidate.finish_reason.as_deref() {
                events.push(StreamEvent::Finish(parse_finish_reason(reason, self.saw_tool_call)));
            }
        }

        if let Some(usage) = chunk.usage_metadata {
            events.push(StreamEvent::Usage(usage.into()));
        }

        events
    }
}
