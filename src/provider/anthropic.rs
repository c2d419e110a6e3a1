//! Anthropic Messages API: wire types, canonical <-> wire conversion, and
//! the non-streaming request/response path. The streaming path lives in
//! [`stream`].

pub(crate) mod stream;

use reqwest::{Client, Method, header::CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, classify};
use crate::oauth::OAuthCredentials;
use crate::types::{
    ChatRequest, ChatResponse, Choice, FinishReason, FunctionCall, Message, ReasoningEffort, Role, ToolCall,
    ToolDefinition, Usage,
};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const MODEL_CEILING: u32 = 128_000;
const MIN_OUTPUT_BUDGET: u32 = 1024;

/// Leading block of the OAuth-mode system prompt, prepended ahead of the
/// caller's own system text so the server sees the identity it expects from
/// an OAuth-authenticated session.
const OAUTH_IDENTITY_PREFIX: &str = "You are an AI coding assistant operating through an OAuth-authenticated session.";

fn thinking_budget(effort: ReasoningEffort) -> Option<u32> {
    match effort {
        ReasoningEffort::Off => None,
        ReasoningEffort::Minimal => Some(1024),
        ReasoningEffort::Low => Some(2048),
        ReasoningEffort::Medium => Some(8192),
        ReasoningEffort::High | ReasoningEffort::Xhigh => Some(16384),
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

impl From<&ToolDefinition> for AnthropicTool {
    fn from(tool: &ToolDefinition) -> Self {
        AnthropicTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
enum AnthropicRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: AnthropicRole,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicThinking {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl CacheControl {
    fn ephemeral() -> Self {
        CacheControl { kind: "ephemeral" }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    cache_control: CacheControl,
}

impl SystemBlock {
    fn new(text: impl Into<String>) -> Self {
        SystemBlock {
            kind: "text",
            text: text.into(),
            cache_control: CacheControl::ephemeral(),
        }
    }
}

/// The `system` field's two observed shapes (§4.2): a plain string in the
/// ordinary API-key path, or an ordered array of cache-annotated blocks when
/// OAuth mode is active. Both are externally observable wire contracts; the
/// encoding chosen here must match what the server accepts.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum SystemPrompt {
    Plain(String),
    Blocks(Vec<SystemBlock>),
}

/// Builds the `system` field. API-key mode encodes a plain system prompt as
/// a bare string (`None` when the caller supplied none). OAuth mode always
/// emits the two-block array `[identity-prefix-block, user-system-block]`,
/// substituting a single space for an absent user system prompt so the
/// block is never empty, mirroring the message-level substitution elsewhere
/// in this builder.
fn build_system_param(system_text: Option<String>, oauth_active: bool) -> Option<SystemPrompt> {
    if !oauth_active {
        return system_text.map(SystemPrompt::Plain);
    }

    let user_text = system_text.filter(|s| !s.is_empty()).unwrap_or_else(|| " ".to_string());
    Some(SystemPrompt::Blocks(vec![
        SystemBlock::new(OAUTH_IDENTITY_PREFIX),
        SystemBlock::new(user_text),
    ]))
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<SystemPrompt>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<AnthropicThinking>,
}

/// Converts one canonical message into the content blocks it contributes
/// to an Anthropic message. Text-only becomes a single text block; an
/// assistant with tool calls emits an optional leading text block
/// followed by one tool_use block per call; a tool-role message becomes
/// one tool_result block.
fn message_to_blocks(message: &Message) -> (AnthropicRole, Vec<AnthropicContentBlock>) {
    match message.role {
        Role::Tool => {
            let role = AnthropicRole::User;
            let block = AnthropicContentBlock::ToolResult {
                tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                content: non_empty_or_space(&message.content),
                is_error: None,
            };
            (role, vec![block])
        }
        Role::Assistant => {
            let role = AnthropicRole::Assistant;
            let mut blocks = Vec::with_capacity(1 + message.tool_calls.len());
            if !message.content.is_empty() {
                blocks.push(AnthropicContentBlock::Text {
                    text: message.content.clone(),
                });
            }
            for call in &message.tool_calls {
                blocks.push(AnthropicContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input: parse_arguments(&call.function.arguments),
                });
            }
            if blocks.is_empty() {
                blocks.push(AnthropicContentBlock::Text {
                    text: " ".to_string(),
                });
            }
            (role, blocks)
        }
        Role::User | Role::System => (
            AnthropicRole::User,
            vec![AnthropicContentBlock::Text {
                text: non_empty_or_space(&message.content),
            }],
        ),
    }
}

fn non_empty_or_space(content: &str) -> String {
    if content.is_empty() {
        " ".to_string()
    } else {
        content.to_string()
    }
}

/// Parses a tool call's JSON-encoded arguments into an object for the
/// wire `input` field. On parse failure substitutes an empty object
/// rather than surfacing the raw string, per the builder's contract.
fn parse_arguments(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

fn role_matches(a: &AnthropicRole, b: &AnthropicRole) -> bool {
    matches!(
        (a, b),
        (AnthropicRole::User, AnthropicRole::User) | (AnthropicRole::Assistant, AnthropicRole::Assistant)
    )
}

/// Builds the ordered Anthropic message list: extracts and concatenates
/// system messages into the `system` field (blank-line separated), then
/// converts the rest and merges consecutive same-role entries by
/// appending content blocks to the previous message, preserving the
/// input block order (I3).
fn build_messages_and_system(messages: &[Message]) -> Result<(Option<String>, Vec<AnthropicMessage>), GatewayError> {
    let system_texts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    let system = if system_texts.is_empty() {
        None
    } else {
        Some(system_texts.join("\n\n"))
    };

    let mut result: Vec<AnthropicMessage> = Vec::new();
    for message in messages.iter().filter(|m| m.role != Role::System) {
        let (role, mut blocks) = message_to_blocks(message);

        match result.last_mut() {
            Some(prev) if role_matches(&prev.role, &role) => {
                prev.content.append(&mut blocks);
            }
            _ => result.push(AnthropicMessage { role, content: blocks }),
        }
    }

    if result.is_empty() {
        return Err(GatewayError::BuildError(
            "no user message to alternate with: Anthropic requires at least one non-system message".to_string(),
        ));
    }

    if !matches!(result[0].role, AnthropicRole::User) {
        return Err(GatewayError::BuildError(
            "the first non-system message in an Anthropic request must have role user".to_string(),
        ));
    }

    Ok((system, result))
}

/// Computes the extended-thinking budget and resulting max_tokens.
/// Asymmetric growth rule: raises the ceiling to
/// `min(max_tokens + budget, model_ceiling)` while guaranteeing at least
/// `MIN_OUTPUT_BUDGET` tokens of room for visible output. If that would
/// leave no room at all, thinking is omitted entirely rather than
/// violating either half of the rule.
///
/// The growth ceiling is capped at `MODEL_CEILING - MIN_OUTPUT_BUDGET`
/// directly, not at `MODEL_CEILING` with a post-hoc shrink: shrinking the
/// budget alone never lowers `grown` once `max_tokens` is already within
/// `budget` of the ceiling, so a cap computed against `MODEL_CEILING` can
/// still return a `max_tokens` that leaves zero output room.
///
/// If the caller's own `max_tokens` is already at or past the growth
/// ceiling, there's no room to grow into at all: thinking is omitted and
/// `max_tokens` is returned exactly as given, rather than silently
/// shrinking a value the caller never asked to have adjusted.
fn apply_thinking_budget(max_tokens: u32, effort: ReasoningEffort) -> (u32, Option<AnthropicThinking>) {
    let Some(budget) = thinking_budget(effort) else {
        return (max_tokens, None);
    };

    let growth_ceiling = MODEL_CEILING.saturating_sub(MIN_OUTPUT_BUDGET);
    if max_tokens >= growth_ceiling {
        return (max_tokens, None);
    }

    let grown = (max_tokens + budget).min(growth_ceiling);
    let actual_budget = grown - max_tokens;

    (
        grown,
        Some(AnthropicThinking {
            kind: "enabled",
            budget_tokens: actual_budget,
        }),
    )
}

pub(crate) fn build_request(request: &ChatRequest, oauth_active: bool) -> Result<AnthropicRequest, GatewayError> {
    let (system, messages) = build_messages_and_system(&request.messages)?;

    let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    let (max_tokens, thinking) = apply_thinking_budget(max_tokens, request.reasoning_effort);

    let tools = request
        .tools
        .as_ref()
        .map(|tools| tools.iter().map(AnthropicTool::from).collect());

    Ok(AnthropicRequest {
        model: request.model.clone(),
        messages,
        system: build_system_param(system, oauth_active),
        max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stream: if request.stream { Some(true) } else { None },
        tools,
        thinking,
    })
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentIn {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub(crate) struct AnthropicUsage {
    #[serde(default)]
    pub(crate) input_tokens: u32,
    #[serde(default)]
    pub(crate) output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseBody {
    #[serde(rename = "type")]
    kind: String,
    id: Option<String>,
    model: Option<String>,
    content: Option<Vec<AnthropicContentIn>>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
    error: Option<AnthropicErrorDetail>,
}

pub(crate) fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("end_turn") | Some("stop_sequence") | _ => FinishReason::Stop,
    }
}

/// Decodes a non-streaming Anthropic Messages response into the
/// canonical form. If the body is a top-level error object, fails with
/// `ProviderError` carrying the nested type and message.
pub(crate) fn decode_response(body: &str, created_now: u64) -> Result<ChatResponse, GatewayError> {
    let parsed: AnthropicResponseBody =
        serde_json::from_str(body).map_err(|e| GatewayError::ProtocolError(format!("failed to decode Anthropic response: {e}")))?;

    if parsed.kind == "error" {
        let detail = parsed.error.unwrap_or(AnthropicErrorDetail {
            kind: "unknown_error".to_string(),
            message: "no error detail provided".to_string(),
        });
        return Err(GatewayError::provider_error(format!("{}: {}", detail.kind, detail.message)));
    }

    let mut content = String::new();
    let mut thinking = String::new();
    let mut tool_calls = Vec::new();

    for block in parsed.content.unwrap_or_default() {
        match block.kind.as_str() {
            "text" => content.push_str(&block.text.unwrap_or_default()),
            "thinking" => thinking.push_str(&block.thinking.unwrap_or_default()),
            "tool_use" => tool_calls.push(ToolCall {
                id: block.id.unwrap_or_default(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: block.name.unwrap_or_default(),
                    arguments: serde_json::to_string(&block.input.unwrap_or(Value::Object(Default::default())))
                        .unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            _ => {}
        }
    }

    let finish_reason = map_stop_reason(parsed.stop_reason.as_deref());
    let usage = parsed.usage.unwrap_or_default();

    Ok(ChatResponse {
        id: parsed.id.unwrap_or_default(),
        model: parsed.model.unwrap_or_default(),
        created: created_now,
        choices: vec![Choice {
            index: 0,
            message: Message {
                role: Role::Assistant,
                content,
                thinking: if thinking.is_empty() { None } else { Some(thinking) },
                tool_calls,
                tool_call_id: None,
            },
            finish_reason,
        }],
        usage: Usage::new(usage.input_tokens, usage.output_tokens),
        rate_limits: Default::default(),
    })
}

/// Applies the auth headers for one request: `x-api-key` in the ordinary
/// path, or `Authorization: Bearer` plus the OAuth beta flag when the
/// caller supplied an OAuth credential.
pub(crate) fn apply_auth_headers(
    builder: reqwest::RequestBuilder,
    api_key: &SecretString,
    oauth: Option<&OAuthCredentials>,
) -> reqwest::RequestBuilder {
    match oauth {
        Some(oauth) => builder
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", oauth.expose()))
            .header("anthropic-beta", "oauth-2025-04-20"),
        None => builder.header("x-api-key", api_key.expose_secret()),
    }
}

/// Sends one Anthropic Messages request attempt (non-streaming). Returns
/// the decoded response on success, or a classified `GatewayError` with
/// the `Retry-After` delay extracted when the response was a 429.
pub(crate) async fn send_once(
    client: &Client,
    base_url: &str,
    api_key: &SecretString,
    oauth: Option<&OAuthCredentials>,
    request: &AnthropicRequest,
) -> Result<ChatResponse, (GatewayError, Option<std::time::Duration>)> {
    let url = format!("{base_url}/messages");

    let builder = client
        .request(Method::POST, &url)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header(CONTENT_TYPE, "application/json");
    let response = apply_auth_headers(builder, api_key, oauth)
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

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err((classify(Some(status.as_u16()), &body), retry_after));
    }

    let body = response.text().await.map_err(|e| (GatewayError::from(e), None))?;
    let created_now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    decode_response(&body, created_now).map_err(|e| (e, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatRequest, FunctionCall, Message, Role, ToolCall};

    fn user(content: &str) -> Message {
        Message {
            role: Role::User,
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn system_messages_join_with_blank_line() {
        let messages = vec![
            Message {
                role: Role::System,
                content: "Be terse.".to_string(),
                ..Default::default()
            },
            Message {
                role: Role::System,
                content: "Never apologize.".to_string(),
                ..Default::default()
            },
            user("hi"),
        ];
        let (system, _) = build_messages_and_system(&messages).unwrap();
        assert_eq!(system.unwrap(), "Be terse.\n\nNever apologize.");
    }

    #[test]
    fn empty_system_yields_none() {
        let messages = vec![user("hi")];
        let (system, _) = build_messages_and_system(&messages).unwrap();
        assert!(system.is_none());
    }

    #[test]
    fn empty_message_list_is_build_error() {
        let err = build_messages_and_system(&[]).unwrap_err();
        assert!(matches!(err, GatewayError::BuildError(_)));
    }

    #[test]
    fn first_non_system_message_must_be_user() {
        let messages = vec![Message {
            role: Role::Assistant,
            content: "hi".to_string(),
            ..Default::default()
        }];
        let err = build_messages_and_system(&messages).unwrap_err();
        assert!(matches!(err, GatewayError::BuildError(_)));
    }

    #[test]
    fn consecutive_same_role_messages_merge_preserving_order() {
        let messages = vec![
            user("first"),
            Message {
                role: Role::Tool,
                content: String::new(),
                tool_call_id: Some("call_1".to_string()),
                ..Default::default()
            },
        ];
        // user + tool(->user) merge into a single user message with two blocks in order.
        let (_, anthropic_messages) = build_messages_and_system(&messages).unwrap();
        assert_eq!(anthropic_messages.len(), 1);
        assert_eq!(anthropic_messages[0].content.len(), 2);
    }

    #[test]
    fn tool_message_maps_to_tool_result_with_matching_id() {
        let messages = vec![
            user("search for X"),
            Message {
                role: Role::Assistant,
                content: "Let me search.".to_string(),
                tool_calls: vec![ToolCall {
                    id: "call_123".to_string(),
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name: "search".to_string(),
                        arguments: r#"{"query":"X"}"#.to_string(),
                    },
                }],
                ..Default::default()
            },
            Message {
                role: Role::Tool,
                content: "Found Y".to_string(),
                tool_call_id: Some("call_123".to_string()),
                ..Default::default()
            },
        ];

        let (_, anthropic_messages) = build_messages_and_system(&messages).unwrap();
        assert_eq!(anthropic_messages.len(), 3);
        assert!(matches!(anthropic_messages[1].role, AnthropicRole::Assistant));
        assert_eq!(anthropic_messages[1].content.len(), 2);
        match &anthropic_messages[2].content[0] {
            AnthropicContentBlock::ToolResult { tool_use_id, .. } => assert_eq!(tool_use_id, "call_123"),
            other => panic!("expected tool_result block, got {other:?}"),
        }
    }

    #[test]
    fn invalid_tool_argument_json_substitutes_empty_object() {
        let value = parse_arguments("not json");
        assert_eq!(value, Value::Object(serde_json::Map::new()));
    }

    #[test]
    fn max_tokens_defaults_when_absent() {
        let request = ChatRequest::new("claude-3-opus-20240229", vec![user("hi")]);
        let built = build_request(&request, false).unwrap();
        assert_eq!(built.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn system_param_is_plain_string_outside_oauth() {
        let built = build_system_param(Some("Be terse.".to_string()), false);
        assert!(matches!(built, Some(SystemPrompt::Plain(text)) if text == "Be terse."));
    }

    #[test]
    fn system_param_absent_outside_oauth_with_no_system_text() {
        assert!(build_system_param(None, false).is_none());
    }

    #[test]
    fn oauth_system_param_is_two_block_array_with_identity_prefix() {
        let built = build_system_param(Some("Be terse.".to_string()), true);
        let Some(SystemPrompt::Blocks(blocks)) = built else {
            panic!("expected block array in OAuth mode");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, OAUTH_IDENTITY_PREFIX);
        assert_eq!(blocks[1].text, "Be terse.");
    }

    #[test]
    fn oauth_system_param_substitutes_space_for_absent_user_system() {
        let built = build_system_param(None, true);
        let Some(SystemPrompt::Blocks(blocks)) = built else {
            panic!("expected block array in OAuth mode");
        };
        assert_eq!(blocks[1].text, " ");
    }

    #[test]
    fn thinking_budget_grows_ceiling_and_guarantees_min_output() {
        let (max_tokens, thinking) = apply_thinking_budget(4096, ReasoningEffort::Medium);
        assert_eq!(max_tokens, 4096 + 8192);
        assert_eq!(thinking.unwrap().budget_tokens, 8192);
    }

    #[test]
    fn thinking_omitted_without_shrinking_max_tokens_near_ceiling() {
        // Already within MIN_OUTPUT_BUDGET of the ceiling: no room to grow
        // into, so thinking is skipped and max_tokens passes through as-is
        // rather than being silently clamped down.
        let near_ceiling = MODEL_CEILING - 500;
        let (max_tokens, thinking) = apply_thinking_budget(near_ceiling, ReasoningEffort::High);
        assert_eq!(max_tokens, near_ceiling);
        assert!(thinking.is_none());
    }

    #[test]
    fn thinking_budget_shrinks_to_fit_before_ceiling() {
        // Two thousand tokens of room before the ceiling: the nominal
        // 16384-token High budget is shrunk to fit, not omitted outright.
        let max_tokens = MODEL_CEILING - MIN_OUTPUT_BUDGET - 2000;
        let (grown, thinking) = apply_thinking_budget(max_tokens, ReasoningEffort::High);
        assert_eq!(grown, MODEL_CEILING - MIN_OUTPUT_BUDGET);
        assert!(MODEL_CEILING - grown >= MIN_OUTPUT_BUDGET);
        let budget = thinking.unwrap().budget_tokens;
        assert_eq!(budget, 2000);
        assert!(budget < 16384);
    }

    #[test]
    fn decode_response_maps_stop_reasons() {
        let body = serde_json::json!({
            "type": "message",
            "id": "msg_1",
            "model": "claude-3-opus-20240229",
            "content": [{"type": "text", "text": "Hello world"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
        .to_string();

        let response = decode_response(&body, 0).unwrap();
        assert_eq!(response.choices[0].finish_reason, FinishReason::Stop);
        assert_eq!(response.choices[0].message.content, "Hello world");
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn decode_response_surfaces_top_level_error() {
        let body = serde_json::json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "message": "missing field"}
        })
        .to_string();

        let err = decode_response(&body, 0).unwrap_err();
        assert!(matches!(err, GatewayError::ProviderError(_)));
    }
}
