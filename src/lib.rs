//! Provider-neutral gateway for OpenAI-compatible and Anthropic Messages
//! chat back-ends.
//!
//! [`GatewayClient`] is the single entry point: resolve a provider identity
//! once at construction, then call [`GatewayClient::chat`] or
//! [`GatewayClient::chat_stream`] with canonical [`ChatRequest`] values.
//! Everything underneath — request building, response decoding, SSE
//! parsing, retries, and fallback model attempts — is an internal
//! implementation detail the caller never touches directly.
//!
//! ```text
//! GatewayClient::chat(request)
//!   -> fallback::run (if fallback_models configured)
//!     -> transport::chat (per candidate model)
//!       -> retry::run_with_retry
//!         -> provider::send_once (dispatches to openai:: or anthropic::)
//! ```

mod error;
mod fallback;
mod http_client;
mod oauth;
mod profile;
mod provider;
mod rate_limits;
mod resolver;
mod retry;
mod transport;
mod types;

pub mod config;

pub use error::{GatewayError, Result};
pub use oauth::OAuthCredentials;
pub use profile::{ModelProfile, lookup as lookup_model_profile, self_interview};
pub use resolver::ProviderId;
pub use retry::RetryPolicy;
pub use types::{
    ChatRequest, ChatResponse, Choice, FinishReason, FunctionCall, Message, RateLimits, ReasoningEffort, Role,
    ToolCall, ToolDefinition, Usage,
};

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use config::ProviderConfig;

/// A resolved, long-lived handle to one provider configuration.
///
/// Cheap to clone: internally an `Arc` around a shared `reqwest::Client`
/// (so connections pool across calls) and a small amount of mutable state
/// — an optional OAuth credential and the most recently used tool
/// definitions — guarded by an async `RwLock`. Every public call takes an
/// immutable snapshot of that state at entry rather than holding the lock
/// across the request, per the gateway's concurrency contract (§5).
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    provider_id: ProviderId,
    base_url: String,
    api_key: SecretString,
    model: String,
    fallback_models: Vec<String>,
    fallback_timeout: Option<Duration>,
    http_timeout: Duration,
    reasoning_effort: ReasoningEffort,
    retry_policy: RetryPolicy,
    oauth: RwLock<Option<OAuthCredentials>>,
    last_tools: RwLock<Vec<ToolDefinition>>,
}

impl GatewayClient {
    /// Builds a client for one resolved provider configuration. Validates
    /// the configuration (§7 `ConfigError`), resolves the provider identity
    /// via [`resolver::resolve`], and falls back to that provider's default
    /// base URL when the caller left `base_url` empty.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let provider_id = resolver::resolve(
            config.provider.as_deref(),
            &config.model,
            Some(config.api_key.expose_secret()),
            Some(config.base_url.as_str()).filter(|url| !url.is_empty()),
        );

        let base_url = if config.base_url.trim().is_empty() {
            provider::default_base_url(provider_id).to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };

        let http = http_client::default_http_client_builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| GatewayError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(GatewayClient {
            inner: Arc::new(Inner {
                http,
                provider_id,
                base_url,
                api_key: config.api_key,
                model: config.model,
                fallback_models: config.fallback_models,
                fallback_timeout: config.fallback_timeout,
                http_timeout: config.http_timeout,
                reasoning_effort: config.reasoning_effort,
                retry_policy: RetryPolicy::default(),
                oauth: RwLock::new(None),
                last_tools: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Uses a non-default retry policy for every attempt this client makes.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        // `Inner` is behind an `Arc`; at this point construction is still
        // exclusive to this call site, so `Arc::get_mut` always succeeds.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry_policy = policy;
        }
        self
    }

    /// The provider identity this client resolved to at construction.
    pub fn provider_id(&self) -> ProviderId {
        self.inner.provider_id
    }

    /// Installs (or clears) the OAuth credential used for the Anthropic
    /// branch's alternate system-prompt encoding. Takes the write lock
    /// only for the duration of the swap.
    pub async fn set_oauth_credentials(&self, credentials: Option<OAuthCredentials>) {
        *self.inner.oauth.write().await = credentials;
    }

    /// The tool definitions most recently passed to [`chat`](Self::chat) or
    /// [`chat_stream`](Self::chat_stream), kept for response reverse-mapping
    /// by callers that need to correlate a returned tool call back to its
    /// definition.
    pub async fn last_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.inner.last_tools.read().await.clone()
    }

    /// The recommended sampling profile for this client's configured model.
    pub fn model_profile(&self) -> ModelProfile {
        profile::lookup(&self.inner.model)
    }

    /// Issues the self-interview query (§4.8) against this client's primary
    /// model, falling back to the static profile on any failure.
    pub async fn interview_model(&self) -> ModelProfile {
        let model = self.inner.model.clone();
        profile::self_interview(&model, |request| async move {
            self.chat(request, &CancellationToken::new()).await
        })
        .await
    }

    async fn snapshot_oauth(&self) -> Option<OAuthCredentials> {
        self.inner.oauth.read().await.clone()
    }

    async fn remember_tools(&self, request: &ChatRequest) {
        if let Some(tools) = &request.tools {
            *self.inner.last_tools.write().await = tools.clone();
        }
    }

    /// Fills in any sampling knob the caller left unset from this client's
    /// model profile and configured reasoning effort, without overriding
    /// anything the caller explicitly provided.
    fn apply_defaults(&self, mut request: ChatRequest) -> ChatRequest {
        let profile = self.model_profile();
        request.temperature.get_or_insert(profile.temperature);
        request.top_p.get_or_insert(profile.top_p);
        request.max_tokens.get_or_insert(profile.max_tokens);
        if request.reasoning_effort == ReasoningEffort::Off {
            request.reasoning_effort = self.inner.reasoning_effort;
        }
        request
    }

    /// Sends one non-streaming chat request, retried per this client's
    /// [`RetryPolicy`] and, when fallback models are configured, reattempted
    /// against each fallback in order on failure (§4.6). `cancel` aborts
    /// pending I/O, backoff sleeps, and further fallback attempts.
    pub async fn chat(&self, request: ChatRequest, cancel: &CancellationToken) -> Result<ChatResponse> {
        self.remember_tools(&request).await;
        let request = self.apply_defaults(request);
        let oauth = self.snapshot_oauth().await;

        if self.inner.fallback_models.is_empty() {
            return transport::chat(
                &self.inner.http,
                self.inner.provider_id,
                &self.inner.base_url,
                &self.inner.api_key,
                oauth.as_ref(),
                &request,
                self.inner.retry_policy,
                cancel,
            )
            .await;
        }

        let timeout = self.effective_attempt_timeout();
        let original_model = request.model.clone();

        fallback::run(&original_model, &self.inner.fallback_models, timeout, |candidate| {
            let mut attempt_request = request.clone();
            attempt_request.model = candidate.to_string();
            let oauth = oauth.clone();
            async move {
                transport::chat(
                    &self.inner.http,
                    self.inner.provider_id,
                    &self.inner.base_url,
                    &self.inner.api_key,
                    oauth.as_ref(),
                    &attempt_request,
                    self.inner.retry_policy,
                    cancel,
                )
                .await
            }
        })
        .await
    }

    /// Sends one streaming chat request, firing `on_delta(content, thinking,
    /// done)` synchronously as fragments arrive and returning the
    /// accumulated canonical response once the stream (or, with fallbacks
    /// configured, the eventually successful candidate's stream) terminates.
    pub async fn chat_stream(
        &self,
        request: ChatRequest,
        mut on_delta: impl FnMut(&str, &str, bool) + Send,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        self.remember_tools(&request).await;
        let request = self.apply_defaults(request);
        let oauth = self.snapshot_oauth().await;
        let on_delta: &mut dyn FnMut(&str, &str, bool) = &mut on_delta;

        if self.inner.fallback_models.is_empty() {
            return transport::chat_stream(
                &self.inner.http,
                self.inner.provider_id,
                &self.inner.base_url,
                &self.inner.api_key,
                oauth.as_ref(),
                &request,
                self.inner.retry_policy,
                on_delta,
                cancel,
            )
            .await;
        }

        let timeout = self.effective_attempt_timeout();

        fallback::run_stream(
            &self.inner.http,
            self.inner.provider_id,
            &self.inner.base_url,
            &self.inner.api_key,
            oauth.as_ref(),
            &request,
            &self.inner.fallback_models,
            timeout,
            self.inner.retry_policy,
            on_delta,
            cancel,
        )
        .await
    }

    fn effective_attempt_timeout(&self) -> Duration {
        self.inner.fallback_timeout.unwrap_or(self.inner.http_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ProviderConfig {
        ProviderConfig::new("https://api.openai.com/v1", "sk-test", "gpt-4o")
    }

    #[test]
    fn resolves_provider_at_construction() {
        let client = GatewayClient::new(sample_config()).unwrap();
        assert_eq!(client.provider_id(), ProviderId::OpenAi);
    }

    #[test]
    fn empty_base_url_falls_back_to_provider_default() {
        let mut config = sample_config();
        config.base_url = String::new();
        config.model = "claude-3-opus-20240229".to_string();
        config.api_key = secrecy::SecretString::from("sk-ant-test".to_string());
        let client = GatewayClient::new(config).unwrap();
        assert_eq!(client.provider_id(), ProviderId::Anthropic);
        assert_eq!(client.inner.base_url, "https://api.anthropic.com/v1");
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = sample_config();
        config.model = String::new();
        assert!(GatewayClient::new(config).is_err());
    }

    #[test]
    fn apply_defaults_fills_only_unset_knobs() {
        let client = GatewayClient::new(sample_config()).unwrap();
        let mut request = ChatRequest::new("gpt-4o", vec![]);
        request.temperature = Some(0.2);

        let filled = client.apply_defaults(request);
        assert_eq!(filled.temperature, Some(0.2));
        assert!(filled.top_p.is_some());
        assert!(filled.max_tokens.is_some());
    }

    #[tokio::test]
    async fn remembers_last_tool_definitions() {
        let client = GatewayClient::new(sample_config()).unwrap();
        let tools = vec![ToolDefinition {
            name: "search".to_string(),
            description: "search the web".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let mut request = ChatRequest::new("gpt-4o", vec![]);
        request.tools = Some(tools.clone());

        client.remember_tools(&request).await;
        assert_eq!(client.last_tool_definitions().await.len(), 1);
        assert_eq!(client.last_tool_definitions().await[0].name, "search");
    }

    #[tokio::test]
    async fn oauth_credentials_round_trip() {
        let client = GatewayClient::new(sample_config()).unwrap();
        assert!(client.snapshot_oauth().await.is_none());

        client.set_oauth_credentials(Some(OAuthCredentials::new("token-123"))).await;
        let snapshot = client.snapshot_oauth().await;
        assert!(snapshot.is_some());

        client.set_oauth_credentials(None).await;
        assert!(client.snapshot_oauth().await.is_none());
    }
}
