//! Incremental SSE decoder for the Anthropic Messages streaming API.
//! Unlike OpenAI's flat delta chunks, Anthropic frames a typed sequence of
//! events (`message_start`, `content_block_start/delta/stop`,
//! `message_delta`, `message_stop`, `ping`, `error`). The parser keeps a
//! server-index -> tool-call-slot map so interleaved `tool_use` blocks
//! never cross-contaminate each other's argument fragments (§4.4).

use std::collections::BTreeMap;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, Method, header::CONTENT_TYPE};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{ANTHROPIC_VERSION, AnthropicRequest, apply_auth_headers, map_stop_reason};
use crate::error::{GatewayError, classify};
use crate::oauth::OAuthCredentials;
use crate::rate_limits;
use crate::types::{ChatResponse, Choice, FinishReason, FunctionCall, Message, Role, ToolCall, Usage};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart { message: MessageStart },
    ContentBlockStart { index: u32, content_block: ContentBlockStart },
    ContentBlockDelta { index: u32, delta: BlockDelta },
    ContentBlockStop { #[serde(default)] index: u32 },
    MessageDelta { delta: MessageDeltaBody, #[serde(default)] usage: Option<StreamUsage> },
    MessageStop,
    Ping,
    Error { error: StreamErrorBody },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    id: String,
    model: String,
    usage: StreamUsage,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
struct StreamUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockStart {
    Text { #[serde(default)] text: String },
    ToolUse { id: String, name: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[derive(Default)]
struct ToolCallSlot {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Default)]
struct Accumulator {
    id: String,
    model: String,
    content: String,
    thinking: String,
    tool_slots: BTreeMap<u32, ToolCallSlot>,
    finish_reason: Option<FinishReason>,
    usage: StreamUsage,
}

impl Accumulator {
    /// Applies one decoded event, firing `on_delta` for content/thinking
    /// fragments. Returns `Err` only for a terminal `error` event; all
    /// other events are infallible.
    fn apply(&mut self, event: StreamEvent, on_delta: &mut dyn FnMut(&str, &str, bool)) -> Result<bool, GatewayError> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                self.usage = message.usage;
            }
            StreamEvent::ContentBlockStart { index, content_block } => {
                if let ContentBlockStart::ToolUse { id, name } = content_block {
                    self.tool_slots.insert(index, ToolCallSlot { id, name, arguments: String::new() });
                }
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    if !text.is_empty() {
                        self.content.push_str(&text);
                        on_delta(&text, "", false);
                    }
                }
                BlockDelta::ThinkingDelta { thinking } => {
                    if !thinking.is_empty() {
                        self.thinking.push_str(&thinking);
                        on_delta("", &thinking, false);
                    }
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(slot) = self.tool_slots.get_mut(&index) {
                        slot.arguments.push_str(&partial_json);
                    }
                }
                BlockDelta::Unknown => {}
            },
            StreamEvent::ContentBlockStop { .. } => {}
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.finish_reason = Some(map_stop_reason(Some(&reason)));
                }
                if let Some(usage) = usage {
                    self.usage.output_tokens = usage.output_tokens;
                    if usage.input_tokens != 0 {
                        self.usage.input_tokens = usage.input_tokens;
                    }
                }
            }
            StreamEvent::MessageStop => {
                on_delta("", "", true);
                return Ok(true);
            }
            StreamEvent::Ping => {}
            StreamEvent::Error { error } => {
                return Err(GatewayError::provider_error(format!("{}: {}", error.kind, error.message)));
            }
            StreamEvent::Unknown => {}
        }

        Ok(false)
    }

    fn finish(self) -> ChatResponse {
        let tool_calls = self
            .tool_slots
            .into_values()
            .map(|slot| ToolCall {
                id: slot.id,
                kind: "function".to_string(),
                function: FunctionCall {
                    name: slot.name,
                    arguments: if slot.arguments.is_empty() {
                        "{}".to_string()
                    } else {
                        slot.arguments
                    },
                },
            })
            .collect::<Vec<_>>();

        ChatResponse {
            id: self.id,
            model: self.model,
            created: now_unix(),
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: self.content,
                    thinking: if self.thinking.is_empty() { None } else { Some(self.thinking) },
                    tool_calls,
                    tool_call_id: None,
                },
                finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
            }],
            usage: Usage::new(self.usage.input_tokens, self.usage.output_tokens),
            rate_limits: Default::default(),
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Opens an Anthropic Messages streaming request and drives it to
/// completion. Malformed events are logged and skipped (best-effort); a
/// hard transport error or a terminal `error` event propagates. The
/// parser never resumes after `message_stop` or `error`.
pub(crate) async fn send_and_parse(
    client: &Client,
    base_url: &str,
    api_key: &SecretString,
    oauth: Option<&OAuthCredentials>,
    request: &AnthropicRequest,
    on_delta: &mut dyn FnMut(&str, &str, bool),
    cancel: &CancellationToken,
) -> Result<ChatResponse, (GatewayError, Option<Duration>)> {
    let url = format!("{base_url}/messages");

    let builder = client
        .request(Method::POST, &url)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header(CONTENT_TYPE, "application/json")
        .header(reqwest::header::ACCEPT, "text/event-stream");
    let send = apply_auth_headers(builder, api_key, oauth).json(request).send();

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err((GatewayError::Cancelled, None)),
        result = send => result.map_err(|e| (GatewayError::from(e), None))?,
    };

    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(crate::retry::parse_retry_after);
    let limits = rate_limits::parse_anthropic(response.headers());

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err((classify(Some(status.as_u16()), &body), retry_after));
    }

    let mut events = response.bytes_stream().eventsource();
    let mut state = Accumulator::default();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err((GatewayError::Cancelled, None)),
            next = events.next() => next,
        };

        let Some(event) = next else { break };

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                log::warn!("malformed SSE event in Anthropic stream, skipping: {e}");
                continue;
            }
        };

        // `:` comment lines and blank keepalive frames surface here as
        // empty data; eventsource_stream already strips them before we
        // see an Event, but a payload that still fails to parse as JSON
        // is treated the same way: logged and skipped.
        let parsed: Value = match serde_json::from_str(&event.data) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("failed to parse Anthropic stream event as JSON, skipping: {e}");
                continue;
            }
        };

        let decoded: StreamEvent = match serde_json::from_value(parsed) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("failed to decode Anthropic stream event, skipping: {e}");
                continue;
            }
        };

        match state.apply(decoded, on_delta) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => return Err((e, None)),
        }
    }

    let mut response = state.finish();
    response.rate_limits = limits;
    Ok(response)
}
