//! Incremental SSE decoder for the OpenAI-compatible `/chat/completions`
//! stream. Only `data:` lines carry payload; `[DONE]` terminates. Content
//! and reasoning deltas fire the caller's callback immediately; tool-call
//! argument fragments accumulate into per-index slots and are folded into
//! the final [`ChatResponse`] once the stream ends.

use std::collections::BTreeMap;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, Method, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{OpenAIRequest, OpenAIUsage, map_finish_reason};
use crate::error::{GatewayError, classify};
use crate::rate_limits;
use crate::types::{ChatResponse, Choice, FinishReason, FunctionCall, Message, Role, ToolCall, Usage};

#[derive(Debug, Deserialize)]
struct FunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolCallFragment {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionFragment>,
}

#[derive(Debug, Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallFragment>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    created: Option<u64>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Default)]
struct ToolCallSlot {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates a canonical [`ChatResponse`] out of an in-order sequence of
/// chunks. Slots are keyed by the server's `index`, matching invariant I2:
/// argument fragments for the same slot concatenate in arrival order
/// regardless of interleaving with other slots or content deltas.
#[derive(Default)]
struct Accumulator {
    id: String,
    model: String,
    created: u64,
    content: String,
    thinking: String,
    tool_slots: BTreeMap<u32, ToolCallSlot>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl Accumulator {
    fn apply(&mut self, chunk: Chunk, on_delta: &mut dyn FnMut(&str, &str, bool)) {
        if let Some(id) = chunk.id {
            self.id = id;
        }
        if let Some(model) = chunk.model {
            self.model = model;
        }
        if let Some(created) = chunk.created {
            self.created = created;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    self.content.push_str(&content);
                    on_delta(&content, "", false);
                }
            }

            if let Some(reasoning) = choice.delta.reasoning_content {
                if !reasoning.is_empty() {
                    self.thinking.push_str(&reasoning);
                    on_delta("", &reasoning, false);
                }
            }

            for fragment in choice.delta.tool_calls {
                let slot = self.tool_slots.entry(fragment.index).or_default();
                if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                    slot.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        slot.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        slot.arguments.push_str(&arguments);
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(map_finish_reason(Some(&reason)));
            }
        }
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
                    arguments: slot.arguments,
                },
            })
            .collect::<Vec<_>>();

        let finish_reason = self.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });

        ChatResponse {
            id: self.id,
            model: self.model,
            created: self.created,
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: self.content,
                    thinking: if self.thinking.is_empty() { None } else { Some(self.thinking) },
                    tool_calls,
                    tool_call_id: None,
                },
                finish_reason,
            }],
            usage: self.usage.unwrap_or_default(),
            rate_limits: Default::default(),
        }
    }
}

/// Opens an OpenAI-compatible streaming request and drives it to
/// completion, firing `on_delta` for each content/thinking fragment and
/// `on_delta("", "", true)` once on normal termination. Cancellation
/// aborts the loop on the next suspension point (initial connect or the
/// next SSE read) and returns [`GatewayError::Cancelled`].
pub(crate) async fn send_and_parse(
    client: &Client,
    base_url: &str,
    api_key: &SecretString,
    request: &OpenAIRequest,
    on_delta: &mut dyn FnMut(&str, &str, bool),
    cancel: &CancellationToken,
) -> Result<ChatResponse, (GatewayError, Option<Duration>)> {
    let url = format!("{base_url}/chat/completions");

    let send = client
        .request(Method::POST, &url)
        .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(request)
        .send();

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
    let limits = rate_limits::parse_openai(response.headers());

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
                log::warn!("malformed SSE event in OpenAI stream, skipping: {e}");
                continue;
            }
        };

        if event.data == "[DONE]" {
            break;
        }

        match serde_json::from_str::<Chunk>(&event.data) {
            Ok(chunk) => state.apply(chunk, on_delta),
            Err(e) => log::warn!("failed to parse OpenAI stream chunk, skipping: {e}"),
        }
    }

    on_delta("", "", true);
    let mut response = state.finish();
    response.rate_limits = limits;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_fragments_reassemble_across_chunks() {
        let mut state = Accumulator::default();
        let mut calls = Vec::new();
        let mut on_delta = |c: &str, t: &str, d: bool| calls.push((c.to_string(), t.to_string(), d));

        let a: Chunk = serde_json::from_value(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "search", "arguments": ""}}]}}]
        }))
        .unwrap();
        let b: Chunk = serde_json::from_value(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"q\":"}}]}}]
        }))
        .unwrap();
        let c: Chunk = serde_json::from_value(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "\"test\"}"}}]}}]
        }))
        .unwrap();
        let d: Chunk = serde_json::from_value(serde_json::json!({
            "choices": [{"delta": {}, "finish_reason": "tool_calls"}]
        }))
        .unwrap();

        state.apply(a, &mut on_delta);
        state.apply(b, &mut on_delta);
        state.apply(c, &mut on_delta);
        state.apply(d, &mut on_delta);

        let response = state.finish();
        assert_eq!(response.choices[0].finish_reason, FinishReason::ToolCalls);
        let call = &response.choices[0].message.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.function.name, "search");
        assert_eq!(call.function.arguments, r#"{"q":"test"}"#);
    }

    #[test]
    fn thinking_deltas_never_touch_content_buffer() {
        let mut state = Accumulator::default();
        let mut on_delta = |_: &str, _: &str, _: bool| {};

        let chunk: Chunk = serde_json::from_value(serde_json::json!({
            "choices": [{"delta": {"reasoning_content": "pondering..."}}]
        }))
        .unwrap();
        state.apply(chunk, &mut on_delta);

        assert_eq!(state.content, "");
        assert_eq!(state.thinking, "pondering...");
    }

    #[test]
    fn content_deltas_concatenate_in_order() {
        let mut state = Accumulator::default();
        let mut on_delta = |_: &str, _: &str, _: bool| {};

        for piece in ["Hello", " ", "world"] {
            let chunk: Chunk = serde_json::from_value(serde_json::json!({
                "choices": [{"delta": {"content": piece}}]
            }))
            .unwrap();
            state.apply(chunk, &mut on_delta);
        }

        assert_eq!(state.content, "Hello world");
    }
}
