//! OpenAI-compatible `/chat/completions`: wire types, canonical <-> wire
//! conversion, and the non-streaming request/response path. Every
//! provider identity other than `anthropic` speaks this wire format. The
//! streaming path lives in [`stream`].

pub(crate) mod stream;

use reqwest::{Client, Method, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, classify};
use crate::rate_limits;
use crate::types::{ChatRequest, ChatResponse, Choice, FinishReason, FunctionCall, Message, Role, ToolCall, ToolDefinition};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAIFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAITool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIFunctionDef,
}

impl From<&ToolDefinition> for OpenAITool {
    fn from(tool: &ToolDefinition) -> Self {
        OpenAITool {
            kind: "function",
            function: OpenAIFunctionDef {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: OpenAIFunctionCall,
}

impl From<&ToolCall> for OpenAIToolCall {
    fn from(call: &ToolCall) -> Self {
        OpenAIToolCall {
            id: call.id.clone(),
            kind: call.kind.clone(),
            function: OpenAIFunctionCall {
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAIMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for OpenAIMessage {
    fn from(message: &Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(message.tool_calls.iter().map(OpenAIToolCall::from).collect())
        };

        // Straight field mapping (§4.2): content travels through as-is,
        // empty string included, since the OpenAI wire format (unlike
        // Anthropic's) tolerates empty text content.
        OpenAIMessage {
            role,
            content: Some(message.content.clone()),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StreamOptions {
    pub(crate) include_usage: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    pub(crate) stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "reasoning_effort")]
    reasoning_effort: Option<&'static str>,
}

/// Builds the OpenAI-compatible request body: a straight field mapping,
/// plus `tool_choice: "auto"` whenever tools are present (there's no way to
/// force a specific tool or disable choice, so this is the only value ever
/// sent) and a top-level `reasoning_effort` string whenever the caller asked
/// for one.
pub(crate) fn build_request(request: &ChatRequest) -> OpenAIRequest {
    let tools: Option<Vec<OpenAITool>> = request.tools.as_ref().map(|tools| tools.iter().map(OpenAITool::from).collect());
    let tool_choice = if tools.is_some() { Some("auto") } else { None };

    OpenAIRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(OpenAIMessage::from).collect(),
        tools,
        tool_choice,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        stream: request.stream,
        stream_options: None,
        reasoning_effort: reasoning_effort_tag(request.reasoning_effort),
    }
}

fn reasoning_effort_tag(effort: crate::types::ReasoningEffort) -> Option<&'static str> {
    use crate::types::ReasoningEffort as R;
    match effort {
        R::Off => None,
        R::Minimal => Some("minimal"),
        R::Low => Some("low"),
        R::Medium => Some("medium"),
        R::High => Some("high"),
        R::Xhigh => Some("xhigh"),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallIn {
    id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    kind: String,
    function: OpenAIFunctionCallIn,
}

fn default_tool_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCallIn {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessageIn {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCallIn>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoiceIn {
    index: u32,
    message: OpenAIMessageIn,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub(crate) struct OpenAIUsage {
    #[serde(default)]
    pub(crate) prompt_tokens: u32,
    #[serde(default)]
    pub(crate) completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseBody {
    id: String,
    model: String,
    created: u64,
    choices: Vec<OpenAIChoiceIn>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

pub(crate) fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Decodes a non-streaming OpenAI chat completion response: a direct JSON
/// decode into the wire shape, then a field-by-field conversion into the
/// canonical form.
pub(crate) fn decode_response(body: &str) -> Result<ChatResponse, GatewayError> {
    let parsed: OpenAIResponseBody =
        serde_json::from_str(body).map_err(|e| GatewayError::ProtocolError(format!("failed to decode OpenAI response: {e}")))?;

    let usage = parsed.usage.unwrap_or_default();

    let choices = parsed
        .choices
        .into_iter()
        .map(|choice| Choice {
            index: choice.index,
            finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
            message: Message {
                role: Role::Assistant,
                content: choice.message.content.unwrap_or_default(),
                thinking: choice.message.reasoning_content,
                tool_calls: choice
                    .message
                    .tool_calls
                    .into_iter()
                    .map(|call| ToolCall {
                        id: call.id,
                        kind: call.kind,
                        function: FunctionCall {
                            name: call.function.name,
                            arguments: call.function.arguments,
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
        })
        .collect();

    Ok(ChatResponse {
        id: parsed.id,
        model: parsed.model,
        created: parsed.created,
        choices,
        usage: crate::types::Usage::new(usage.prompt_tokens, usage.completion_tokens),
        rate_limits: Default::default(),
    })
}

/// Sends one OpenAI-compatible request attempt (non-streaming). Returns
/// the decoded response on success, or a classified `GatewayError` with
/// the `Retry-After` delay extracted when the response was a 429.
pub(crate) async fn send_once(
    client: &Client,
    base_url: &str,
    api_key: &SecretString,
    request: &OpenAIRequest,
) -> Result<ChatResponse, (GatewayError, Option<std::time::Duration>)> {
    let url = format!("{base_url}/chat/completions");

    let response = client
        .request(Method::POST, &url)
        .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
        .json(request)
        .send()
        .await
        .map_err(|e| (GatewayError::from(e), None))?;

    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(crate::retry::parse_retry_after);
    let limits = rate_limits::parse_openai(response.headers());

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        log::warn!("OpenAI-compatible request failed with status {status}");
        return Err((classify(Some(status.as_u16()), &body), retry_after));
    }

    let body = response.text().await.map_err(|e| (GatewayError::from(e), None))?;

    let mut decoded = decode_response(&body).map_err(|e| (e, None))?;
    decoded.rate_limits = limits;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatRequest, Message, ReasoningEffort, Role, ToolDefinition};

    fn user(content: &str) -> Message {
        Message {
            role: Role::User,
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn tool_choice_auto_only_when_tools_present() {
        let mut request = ChatRequest::new("gpt-4o", vec![user("hi")]);
        assert!(build_request(&request).tool_choice.is_none());

        request.tools = Some(vec![ToolDefinition {
            name: "search".to_string(),
            description: "search the web".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }]);
        assert_eq!(build_request(&request).tool_choice, Some("auto"));
    }

    #[test]
    fn reasoning_effort_included_when_not_off() {
        let mut request = ChatRequest::new("gpt-4o", vec![user("hi")]);
        assert!(build_request(&request).reasoning_effort.is_none());

        request.reasoning_effort = ReasoningEffort::High;
        assert_eq!(build_request(&request).reasoning_effort, Some("high"));
    }

    #[test]
    fn decode_response_happy_path() {
        let body = serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
        .to_string();

        let response = decode_response(&body).unwrap();
        assert_eq!(response.id, "chatcmpl-123");
        assert_eq!(response.choices[0].message.content, "Hello!");
        assert_eq!(response.choices[0].finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn decode_response_maps_tool_calls_finish_reason() {
        let body = serde_json::json!({
            "id": "chatcmpl-abc",
            "created": 0,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"q\":\"test\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })
        .to_string();

        let response = decode_response(&body).unwrap();
        assert_eq!(response.choices[0].finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.choices[0].message.tool_calls.len(), 1);
        assert_eq!(response.choices[0].message.tool_calls[0].function.arguments, r#"{"q":"test"}"#);
    }
}
