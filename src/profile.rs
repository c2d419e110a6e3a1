//! Recommended sampling parameters per model, with a coarse-to-fine
//! fallback, plus an optional self-interview that asks the active model
//! to describe its own capabilities.

use serde::Deserialize;
use serde_json::Value;

use crate::error::GatewayError;
use crate::types::{ChatRequest, ChatResponse, Message, Role};

/// Recommended parameters and capability flags for a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub context_window: u32,
    pub supports_tools: bool,
}

const DEFAULT_PROFILE: ModelProfile = ModelProfile {
    temperature: 0.7,
    top_p: 0.9,
    max_tokens: 4096,
    context_window: 8000,
    supports_tools: true,
};

const EXACT_MATCHES: &[(&str, ModelProfile)] = &[
    (
        "claude-3-opus-20240229",
        ModelProfile {
            temperature: 1.0,
            top_p: 0.999,
            max_tokens: 4096,
            context_window: 200_000,
            supports_tools: true,
        },
    ),
    (
        "gpt-4o",
        ModelProfile {
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 4096,
            context_window: 128_000,
            supports_tools: true,
        },
    ),
];

const FAMILY_RULES: &[(&str, ModelProfile)] = &[
    (
        "claude",
        ModelProfile {
            temperature: 1.0,
            top_p: 0.999,
            max_tokens: 4096,
            context_window: 200_000,
            supports_tools: true,
        },
    ),
    (
        "gpt",
        ModelProfile {
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 4096,
            context_window: 128_000,
            supports_tools: true,
        },
    ),
    (
        "gemini",
        ModelProfile {
            temperature: 1.0,
            top_p: 0.95,
            max_tokens: 8192,
            context_window: 1_000_000,
            supports_tools: true,
        },
    ),
];

/// Looks up a model's recommended profile: exact match, then substring
/// match against the exact-match table, then family rules, then the
/// conservative static default.
pub fn lookup(model: &str) -> ModelProfile {
    let model_lower = model.to_ascii_lowercase();

    if let Some((_, profile)) = EXACT_MATCHES.iter().find(|(name, _)| *name == model_lower) {
        return profile.clone();
    }

    if let Some((_, profile)) = EXACT_MATCHES.iter().find(|(name, _)| model_lower.contains(name)) {
        return profile.clone();
    }

    if let Some((_, profile)) = FAMILY_RULES.iter().find(|(family, _)| model_lower.contains(family)) {
        return profile.clone();
    }

    DEFAULT_PROFILE
}

const SELF_INTERVIEW_PROMPT: &str = "Describe your own recommended sampling parameters as a single JSON object \
with exactly these fields: context_window (integer), temperature (number), top_p (number), \
max_tokens (integer), supports_tools (boolean). Reply with only the JSON object.";

#[derive(Debug, Deserialize)]
struct SelfInterviewResponse {
    context_window: u32,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    #[serde(default)]
    supports_tools: bool,
}

/// Issues a single structured chat call asking the active model to
/// describe its own parameters. Falls back to the static profile from
/// [`lookup`] on any failure: network error, malformed JSON, or a
/// response that fails validation.
///
/// `send` performs one non-streaming chat call; it is injected so this
/// function stays free of any direct provider dependency.
pub async fn self_interview<F, Fut>(model: &str, send: F) -> ModelProfile
where
    F: FnOnce(ChatRequest) -> Fut,
    Fut: std::future::Future<Output = Result<ChatResponse, GatewayError>>,
{
    match try_self_interview(model, send).await {
        Ok(profile) => profile,
        Err(_) => lookup(model),
    }
}

async fn try_self_interview<F, Fut>(model: &str, send: F) -> Result<ModelProfile, GatewayError>
where
    F: FnOnce(ChatRequest) -> Fut,
    Fut: std::future::Future<Output = Result<ChatResponse, GatewayError>>,
{
    let request = ChatRequest::new(
        model,
        vec![Message {
            role: Role::User,
            content: SELF_INTERVIEW_PROMPT.to_string(),
            ..Default::default()
        }],
    );

    let response = send(request).await?;
    let text = response
        .first_message()
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let value: Value = serde_json::from_str(text)
        .or_else(|_| serde_json::from_str(extract_json_object(text)))
        .map_err(|e| GatewayError::ProtocolError(e.to_string()))?;
    let parsed: SelfInterviewResponse = serde_json::from_value(value)?;

    Ok(validate_and_clamp(parsed))
}

/// Self-interview replies are not guaranteed to contain *only* JSON; grab
/// the first top-level object if the model wrapped it in prose.
fn extract_json_object(text: &str) -> &str {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &text[s..=e],
        _ => text,
    }
}

fn validate_and_clamp(parsed: SelfInterviewResponse) -> ModelProfile {
    let context_window = parsed.context_window.clamp(1000, 2_000_000);
    let temperature = parsed.temperature.clamp(0.0, 1.0);
    let top_p = parsed.top_p.clamp(0.0, 1.0);
    let max_tokens = parsed.max_tokens.min((context_window / 2).max(1)).min(8192);

    ModelProfile {
        temperature,
        top_p,
        max_tokens,
        context_window,
        supports_tools: parsed.supports_tools,
    }
}
