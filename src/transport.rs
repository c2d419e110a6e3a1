//! Ties the retry loop (§4.5) to the provider dispatch layer (§4.1–§4.4)
//! for a single resolved model. [`crate::fallback`] calls this once per
//! candidate; this module never knows about the fallback chain.

use reqwest::Client;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::oauth::OAuthCredentials;
use crate::provider;
use crate::resolver::ProviderId;
use crate::retry::{self, RetryPolicy};
use crate::types::{ChatRequest, ChatResponse};

/// Runs one model's non-streaming attempt under the retry policy.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn chat(
    client: &Client,
    provider_id: ProviderId,
    base_url: &str,
    api_key: &SecretString,
    oauth: Option<&OAuthCredentials>,
    request: &ChatRequest,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ChatResponse, GatewayError> {
    retry::run_with_retry(
        policy,
        |attempt| {
            if attempt > 0 {
                log::debug!("retrying chat request to {provider_id} (attempt {})", attempt + 1);
            }
            provider::send_once(client, provider_id, base_url, api_key, oauth, request)
        },
        || cancel.is_cancelled(),
    )
    .await
}

/// Runs one model's streaming attempt under the retry policy, firing
/// `on_delta` as fragments arrive. A retried attempt opens a fresh
/// connection and accumulates a fresh response; only the eventually
/// successful attempt's accumulated content is returned.
///
/// Written as its own loop rather than going through [`retry::run_with_retry`]:
/// that combinator needs every attempt to produce the same associated
/// `Fut` type, but an attempt here has to reborrow `on_delta` fresh each
/// time, and a future borrowing a per-call reborrow can't be named by a
/// single fixed type. [`retry::retry_decision`] carries the shared backoff
/// decision so both loops agree on when and how long to wait.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn chat_stream(
    client: &Client,
    provider_id: ProviderId,
    base_url: &str,
    api_key: &SecretString,
    oauth: Option<&OAuthCredentials>,
    request: &ChatRequest,
    policy: RetryPolicy,
    on_delta: &mut dyn FnMut(&str, &str, bool),
    cancel: &CancellationToken,
) -> Result<ChatResponse, GatewayError> {
    let mut last_err = None;

    for attempt_no in 0..=policy.max_retries {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        if attempt_no > 0 {
            log::debug!("retrying streaming request to {provider_id} (attempt {})", attempt_no + 1);
        }

        match provider::send_stream(client, provider_id, base_url, api_key, oauth, request, on_delta, cancel).await {
            Ok(response) => return Ok(response),
            Err((err, retry_after)) => match retry::retry_decision(&policy, attempt_no, &err, retry_after) {
                Some(delay) => {
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;

                    if cancel.is_cancelled() {
                        return Err(GatewayError::Cancelled);
                    }
                }
                None => return Err(err),
            },
        }
    }

    Err(last_err.unwrap_or(GatewayError::Transient("retry budget exhausted".to_string())))
}
