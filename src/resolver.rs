//! Maps the caller's configuration into one of the supported provider
//! identities. Pure function of its inputs: given the same four inputs it
//! always returns the same identity, with no side effects and no state.

use std::fmt;

/// A provider identity the gateway knows how to speak to.
///
/// Every identity other than `OpenAi` and `Anthropic` currently resolves
/// to the OpenAI-compatible wire format; the distinction exists so the
/// caller's configuration and logs can name the actual back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Google,
    DeepSeek,
    Groq,
    Mistral,
    Cohere,
    Ollama,
    OpenRouter,
    AzureOpenAi,
    LmStudio,
    Vllm,
    Lambda,
}

impl ProviderId {
    /// Whether this identity's wire protocol is the Anthropic Messages API.
    /// Everything else speaks the OpenAI-compatible `/chat/completions` shape.
    pub fn is_anthropic(self) -> bool {
        matches!(self, ProviderId::Anthropic)
    }

    fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        Some(match tag.as_str() {
            "openai" | "moonshot" | "kimi" => ProviderId::OpenAi,
            "anthropic" => ProviderId::Anthropic,
            "google" => ProviderId::Google,
            "deepseek" => ProviderId::DeepSeek,
            "groq" => ProviderId::Groq,
            "mistral" => ProviderId::Mistral,
            "cohere" => ProviderId::Cohere,
            "ollama" => ProviderId::Ollama,
            "openrouter" => ProviderId::OpenRouter,
            "azure" | "azure_openai" => ProviderId::AzureOpenAi,
            "lmstudio" => ProviderId::LmStudio,
            "vllm" => ProviderId::Vllm,
            "lambda" => ProviderId::Lambda,
            _ => return None,
        })
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Google => "google",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Groq => "groq",
            ProviderId::Mistral => "mistral",
            ProviderId::Cohere => "cohere",
            ProviderId::Ollama => "ollama",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::AzureOpenAi => "azure_openai",
            ProviderId::LmStudio => "lmstudio",
            ProviderId::Vllm => "vllm",
            ProviderId::Lambda => "lambda",
        };
        f.write_str(name)
    }
}

const LOCAL_RUNTIME_MARKER: &str = ":11434";

/// Resolves a provider identity from an explicit tag, a model hint, a
/// credential string, and a base URL. See the resolution order below;
/// each step only fires when the previous ones produced no answer.
pub fn resolve(explicit: Option<&str>, model: &str, credential: Option<&str>, base_url: Option<&str>) -> ProviderId {
    if let Some(tag) = explicit {
        if let Some(id) = ProviderId::from_tag(tag) {
            return id;
        }
    }

    if let Some(id) = resolve_from_model_prefix(model, base_url) {
        return id;
    }

    if let Some(cred) = credential {
        if cred.starts_with("sk-ant-") {
            return ProviderId::Anthropic;
        }
    }

    if base_url.is_some_and(|url| url.contains(LOCAL_RUNTIME_MARKER)) {
        return ProviderId::Ollama;
    }

    ProviderId::OpenAi
}

fn resolve_from_model_prefix(model: &str, base_url: Option<&str>) -> Option<ProviderId> {
    let model = model.to_ascii_lowercase();

    if model.starts_with("claude") {
        return Some(ProviderId::Anthropic);
    }
    if model.starts_with("gpt") || model.starts_with("o1") || model.starts_with("o3") || model.starts_with("o4") {
        return Some(ProviderId::OpenAi);
    }
    if model.starts_with("gemini") {
        return Some(ProviderId::Google);
    }
    if model.starts_with("deepseek") {
        return Some(ProviderId::DeepSeek);
    }
    if model.starts_with("llama")
        || model.starts_with("codellama")
        || model.starts_with("mistral")
        || model.starts_with("phi")
        || model.starts_with("qwen")
    {
        return Some(if base_url.is_some_and(|url| url.contains(LOCAL_RUNTIME_MARKER)) {
            ProviderId::Ollama
        } else {
            ProviderId::OpenAi
        });
    }

    None
}
