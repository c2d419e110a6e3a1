//! Parses each provider's remaining-quota headers into the canonical
//! [`RateLimits`] snapshot. OpenAI expresses resets as durations
//! (`"6m0s"`); Anthropic expresses them as absolute RFC3339 timestamps.
//! Both are normalized to a Unix-seconds "reset at" instant so callers
//! never have to special-case the provider when reading a response.

use reqwest::header::HeaderMap;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::types::RateLimits;

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name)?.parse().ok()
}

/// `x-ratelimit-remaining-requests` / `x-ratelimit-remaining-tokens` plus
/// `x-ratelimit-reset-requests` / `x-ratelimit-reset-tokens`, the latter
/// pair carrying durations like `"1s"` or `"6m0s"`.
pub(crate) fn parse_openai(headers: &HeaderMap) -> RateLimits {
    let remaining_requests = header_u64(headers, "x-ratelimit-remaining-requests");
    let remaining_tokens = header_u64(headers, "x-ratelimit-remaining-tokens");

    let requests_reset_at = header_str(headers, "x-ratelimit-reset-requests")
        .and_then(|v| duration_str::parse_std(v).ok())
        .map(|d| now_unix() + d.as_secs() as i64);
    let tokens_reset_at = header_str(headers, "x-ratelimit-reset-tokens")
        .and_then(|v| duration_str::parse_std(v).ok())
        .map(|d| now_unix() + d.as_secs() as i64);

    RateLimits {
        remaining_requests,
        remaining_tokens,
        requests_reset_at,
        tokens_reset_at,
    }
}

/// `anthropic-ratelimit-{requests,tokens}-remaining` plus
/// `anthropic-ratelimit-{requests,tokens}-reset`, the latter pair carrying
/// absolute RFC3339 timestamps.
pub(crate) fn parse_anthropic(headers: &HeaderMap) -> RateLimits {
    let remaining_requests = header_u64(headers, "anthropic-ratelimit-requests-remaining");
    let remaining_tokens = header_u64(headers, "anthropic-ratelimit-tokens-remaining");

    let requests_reset_at = header_str(headers, "anthropic-ratelimit-requests-reset")
        .and_then(|v| OffsetDateTime::parse(v, &Rfc3339).ok())
        .map(|t| t.unix_timestamp());
    let tokens_reset_at = header_str(headers, "anthropic-ratelimit-tokens-reset")
        .and_then(|v| OffsetDateTime::parse(v, &Rfc3339).ok())
        .map(|t| t.unix_timestamp());

    RateLimits {
        remaining_requests,
        remaining_tokens,
        requests_reset_at,
        tokens_reset_at,
    }
}
