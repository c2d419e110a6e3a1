//! Canonical, provider-neutral types for LLM chat interactions.
//!
//! Every provider module converts to and from these types so that callers
//! never have to deal with OpenAI-shaped or Anthropic-shaped JSON directly.
//! The conversion flow is:
//!
//! ```text
//! ChatRequest → provider::build_request → provider wire format
//! provider wire format → provider::decode_response → ChatResponse
//! ```
//!
//! Canonical messages are value-typed and considered immutable once placed
//! in a request; builders derive provider-specific copies rather than
//! mutating them in place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sender role for a canonical [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation turn in provider-neutral form.
///
/// Empty `content` is permitted here; the Anthropic builder substitutes a
/// single space where the wire format requires non-empty text blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Visible text content. Empty string when the message carries only
    /// tool calls or a tool result.
    #[serde(default)]
    pub content: String,
    /// Auxiliary reasoning/thinking text, kept separate from `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Tool calls requested by the assistant, in the order the model
    /// produced them. Empty on every other role.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Correlation id for a `tool` role message, matching the `id` of the
    /// [`ToolCall`] this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

/// A model-requested function invocation.
///
/// `arguments` is kept as a JSON-encoded string, not yet parsed, so that
/// partial stream fragments can be concatenated verbatim before any parse
/// is attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "ToolCall::default_type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    fn default_type() -> String {
        "function".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as produced or accumulated from the
    /// wire. Callers parse this themselves once the call is complete.
    pub arguments: String,
}

/// A tool the model may call. `parameters` is an unconstrained
/// JSON-schema-shaped value, passed through untouched in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// How much effort a model should spend on internal reasoning before
/// producing visible output. `Off` disables extended thinking entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Off,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

/// A canonical chat request, independent of which provider will serve it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        ChatRequest {
            model: model.into(),
            messages,
            tools: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream: false,
            reasoning_effort: ReasoningEffort::Off,
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
}

/// Token accounting for a single request/response pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Builds usage from prompt/completion counts, computing the total.
    /// Matches invariant I1: total = prompt + completion when both are
    /// non-zero; when one side is unknown (0) the total mirrors the other.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// One candidate completion within a [`ChatResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
}

/// Decoded view of a provider's remaining-quota headers, attached to a
/// response and discarded once the caller has read it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimits {
    pub remaining_requests: Option<u64>,
    pub remaining_tokens: Option<u64>,
    /// Absolute reset time, Unix seconds. Computed from `now + duration`
    /// when the provider emits a relative header instead of a timestamp.
    pub requests_reset_at: Option<i64>,
    pub tokens_reset_at: Option<i64>,
}

/// A canonical chat completion response, decoded from either provider's
/// wire format (or accumulated from a stream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub created: u64,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    #[serde(default)]
    pub rate_limits: RateLimits,
}

impl ChatResponse {
    /// Convenience accessor for the primary (index 0) choice's message.
    pub fn first_message(&self) -> Option<&Message> {
        self.choices.first().map(|c| &c.message)
    }
}
