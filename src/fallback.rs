//! Sequential fallback model attempts, each under the same per-attempt
//! timeout as the primary. Plain async functions, no hidden state,
//! cancellation threaded through explicitly, in keeping with the rest of
//! the gateway.

use std::time::Duration;

use reqwest::Client;
use secrecy::SecretString;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::oauth::OAuthCredentials;
use crate::resolver::ProviderId;
use crate::retry::RetryPolicy;
use crate::transport;
use crate::types::{ChatRequest, ChatResponse};

/// Attempts the primary model under `per_attempt_timeout`, then each
/// fallback in order under the same timeout. Returns the first success.
/// If every candidate fails, returns `AllFallbacksFailed` wrapping the
/// primary's error. The same attempt closure is reused for every
/// candidate; only the model id passed to it changes — the orchestrator
/// never rewrites messages between attempts.
pub async fn run<F, Fut>(
    primary_model: &str,
    fallback_models: &[String],
    per_attempt_timeout: Duration,
    mut attempt: F,
) -> Result<ChatResponse, GatewayError>
where
    F: FnMut(&str) -> Fut,
    Fut: std::future::Future<Output = Result<ChatResponse, GatewayError>>,
{
    let primary_err = match timeout(per_attempt_timeout, attempt(primary_model)).await {
        Ok(Ok(response)) => return Ok(response),
        Ok(Err(GatewayError::Cancelled)) => return Err(GatewayError::Cancelled),
        Ok(Err(err)) => err,
        Err(_) => GatewayError::Transient(format!("primary model '{primary_model}' timed out after {per_attempt_timeout:?}")),
    };

    for candidate in fallback_models {
        match timeout(per_attempt_timeout, attempt(candidate)).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(GatewayError::Cancelled)) => return Err(GatewayError::Cancelled),
            Ok(Err(_)) | Err(_) => continue,
        }
    }

    Err(GatewayError::AllFallbacksFailed(primary_err.to_string()))
}

/// Streaming counterpart of [`run`]. Same primary-then-fallbacks,
/// same-timeout policy, but can't be expressed through a reused attempt
/// closure: `on_delta: &mut dyn FnMut` has to be reborrowed fresh for
/// each candidate's call into [`transport::chat_stream`], and a closure
/// passed to a generic `F: FnMut(&str) -> Fut` combinator needs every
/// call to share one fixed `Fut` type, which a per-call reborrow can't
/// satisfy. So this writes the candidate loop out directly instead.
#[allow(clippy::too_many_arguments)]
pub async fn run_stream(
    client: &Client,
    provider_id: ProviderId,
    base_url: &str,
    api_key: &SecretString,
    oauth: Option<&OAuthCredentials>,
    request: &ChatRequest,
    fallback_models: &[String],
    per_attempt_timeout: Duration,
    policy: RetryPolicy,
    on_delta: &mut dyn FnMut(&str, &str, bool),
    cancel: &CancellationToken,
) -> Result<ChatResponse, GatewayError> {
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        client: &Client,
        provider_id: ProviderId,
        base_url: &str,
        api_key: &SecretString,
        oauth: Option<&OAuthCredentials>,
        request: &ChatRequest,
        model: &str,
        policy: RetryPolicy,
        on_delta: &mut dyn FnMut(&str, &str, bool),
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, GatewayError> {
        let mut attempt_request = request.clone();
        attempt_request.model = model.to_string();
        transport::chat_stream(client, provider_id, base_url, api_key, oauth, &attempt_request, policy, on_delta, cancel).await
    }

    let primary_model = request.model.clone();

    let primary_err = match timeout(
        per_attempt_timeout,
        attempt(client, provider_id, base_url, api_key, oauth, request, &primary_model, policy, on_delta, cancel),
    )
    .await
    {
        Ok(Ok(response)) => return Ok(response),
        Ok(Err(GatewayError::Cancelled)) => return Err(GatewayError::Cancelled),
        Ok(Err(err)) => err,
        Err(_) => GatewayError::Transient(format!("primary model '{primary_model}' timed out after {per_attempt_timeout:?}")),
    };

    for candidate in fallback_models {
        match timeout(
            per_attempt_timeout,
            attempt(client, provider_id, base_url, api_key, oauth, request, candidate, policy, on_delta, cancel),
        )
        .await
        {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(GatewayError::Cancelled)) => return Err(GatewayError::Cancelled),
            Ok(Err(_)) | Err(_) => continue,
        }
    }

    Err(GatewayError::AllFallbacksFailed(primary_err.to_string()))
}
