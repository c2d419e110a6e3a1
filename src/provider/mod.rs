//! Wire-protocol dispatch: every [`ProviderId`] speaks one of two wire
//! formats, OpenAI-compatible `/chat/completions` or the Anthropic
//! Messages API. This module picks the right builder/decoder/stream-parser
//! trio per request; the two protocol modules never need to know about
//! each other.

pub(crate) mod anthropic;
pub(crate) mod openai;

use std::time::Duration;

use reqwest::Client;
use secrecy::SecretString;

use crate::error::GatewayError;
use crate::oauth::OAuthCredentials;
use crate::resolver::ProviderId;
use crate::types::{ChatRequest, ChatResponse};

pub(crate) const DEFAULT_ANTHROPIC_BASE_URL: &str = anthropic::DEFAULT_BASE_URL;
pub(crate) const DEFAULT_OPENAI_BASE_URL: &str = openai::DEFAULT_BASE_URL;

/// The wire format a [`ProviderId`] speaks. Every identity other than
/// `Anthropic` uses the OpenAI-compatible shape; the distinction exists so
/// callers and logs can still name the actual back-end.
pub(crate) fn default_base_url(provider: ProviderId) -> &'static str {
    if provider.is_anthropic() {
        DEFAULT_ANTHROPIC_BASE_URL
    } else {
        DEFAULT_OPENAI_BASE_URL
    }
}

/// Sends one non-streaming attempt. Returns the decoded response, or a
/// classified error paired with an optional `Retry-After` delay so the
/// retry layer can honor it without re-parsing headers itself.
pub(crate) async fn send_once(
    client: &Client,
    provider: ProviderId,
    base_url: &str,
    api_key: &SecretString,
    oauth: Option<&OAuthCredentials>,
    request: &ChatRequest,
) -> Result<ChatResponse, (GatewayError, Option<Duration>)> {
    if provider.is_anthropic() {
        let built = anthropic::build_request(request, oauth.is_some()).map_err(|e| (e, None))?;
        anthropic::send_once(client, base_url, api_key, oauth, &built).await
    } else {
        let built = openai::build_request(request);
        openai::send_once(client, base_url, api_key, &built).await
    }
}

/// Sends one streaming attempt, driving `on_delta` synchronously as
/// fragments arrive and returning the accumulated canonical response once
/// the stream terminates normally.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn send_stream(
    client: &Client,
    provider: ProviderId,
    base_url: &str,
    api_key: &SecretString,
    oauth: Option<&OAuthCredentials>,
    request: &ChatRequest,
    on_delta: &mut dyn FnMut(&str, &str, bool),
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<ChatResponse, (GatewayError, Option<Duration>)> {
    if provider.is_anthropic() {
        let built = anthropic::build_request(request, oauth.is_some()).map_err(|e| (e, None))?;
        anthropic::stream::send_and_parse(client, base_url, api_key, oauth, &built, on_delta, cancel).await
    } else {
        let mut built = openai::build_request(request);
        built.stream = true;
        built.stream_options = Some(openai::StreamOptions { include_usage: true });
        openai::stream::send_and_parse(client, base_url, api_key, &built, on_delta, cancel).await
    }
}
