use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Structured gateway error. Every public entry point returns this kind
/// rather than a raw transport or decode error, so callers can branch on
/// `kind` without inspecting message text.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing required field: empty model, or empty credential when the
    /// resolved provider requires one.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The canonical request could not be serialized into the provider's
    /// wire format (e.g. an unencodable parameter schema).
    #[error("failed to build request: {0}")]
    BuildError(String),

    /// Connection reset, DNS failure, or 5xx. Absorbed by the retry layer
    /// up to its budget.
    #[error("transient error: {0}")]
    Transient(String),

    /// HTTP 429. Retried after honoring `Retry-After`.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The model refused the request because the input was too long. Not
    /// retried; surfaced so callers can compress or split.
    #[error("context too long: {0}")]
    ContextTooLong(String),

    /// A structured error payload emitted by the provider itself, such as
    /// an invalid-request response. Truncated to ~400 characters.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// The response failed schema decode, or SSE framing was unparseable.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Caller-initiated cancellation.
    #[error("cancelled")]
    Cancelled,

    /// Every candidate in a fallback chain failed; wraps the primary
    /// error for the final message.
    #[error("all models failed, primary error: {0}")]
    AllFallbacksFailed(String),
}

const PROVIDER_ERROR_MAX_LEN: usize = 400;

impl GatewayError {
    /// The HTTP status that accompanied this error, when known.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::RateLimited(_) => Some(429),
            GatewayError::ContextTooLong(_) => Some(400),
            _ => None,
        }
    }

    /// Whether the retry layer should attempt this error again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::RateLimited(_))
    }

    pub(crate) fn provider_error(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > PROVIDER_ERROR_MAX_LEN {
            message.truncate(floor_char_boundary(&message, PROVIDER_ERROR_MAX_LEN));
            message.push('…');
        }
        GatewayError::ProviderError(message)
    }
}

/// Classifies a raw provider error surface into one of the gateway's error
/// kinds. Applied to non-2xx HTTP bodies and to provider-emitted SSE
/// `error` events alike.
///
/// Inspects the error's surface text for known signatures rather than
/// relying solely on status code, since some providers (notably
/// context-length refusals) report them with a 400 rather than a
/// dedicated status.
pub fn classify(status: Option<u16>, body: &str) -> GatewayError {
    let lower = body.to_ascii_lowercase();

    if lower.contains("context_length_exceeded") || lower.contains("prompt is too long") {
        return GatewayError::ContextTooLong(truncated(body));
    }

    if status == Some(429) || lower.contains("rate limit") {
        return GatewayError::RateLimited(truncated(body));
    }

    match status {
        Some(s) if s >= 500 => GatewayError::Transient(truncated(body)),
        Some(_) => GatewayError::provider_error(body),
        None => GatewayError::Transient(truncated(body)),
    }
}

fn truncated(body: &str) -> String {
    if body.len() > PROVIDER_ERROR_MAX_LEN {
        format!("{}…", &body[..floor_char_boundary(body, PROVIDER_ERROR_MAX_LEN)])
    } else {
        body.to_string()
    }
}

/// The largest byte index `<= index` that lands on a UTF-8 char boundary.
/// Provider error bodies are arbitrary text and may carry multi-byte
/// characters straddling the truncation point; `str::floor_char_boundary`
/// would do this but is nightly-only.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }

    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            GatewayError::Transient(err.to_string())
        } else if err.is_decode() {
            GatewayError::ProtocolError(err.to_string())
        } else {
            GatewayError::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::ProtocolError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_context_length() {
        let err = classify(Some(400), "Error: context_length_exceeded for this model");
        assert!(matches!(err, GatewayError::ContextTooLong(_)));
    }

    #[test]
    fn classifies_rate_limit() {
        let err = classify(Some(429), "Rate limit reached for requests");
        assert!(matches!(err, GatewayError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn classifies_5xx_as_transient() {
        let err = classify(Some(503), "service unavailable");
        assert!(matches!(err, GatewayError::Transient(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn classifies_other_status_as_provider_error() {
        let err = classify(Some(400), "invalid_request: missing field 'model'");
        assert!(matches!(err, GatewayError::ProviderError(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn truncates_long_provider_messages() {
        let body = "x".repeat(1000);
        let err = GatewayError::provider_error(body);
        let GatewayError::ProviderError(message) = err else {
            panic!("expected ProviderError");
        };
        assert!(message.len() <= PROVIDER_ERROR_MAX_LEN + 1);
    }

    #[test]
    fn truncation_does_not_panic_on_multibyte_boundary() {
        // The 'é' starts at byte 399 and ends at byte 401, so a naive
        // `&body[..400]` slices into the middle of it.
        let mut body = "x".repeat(399);
        body.push('é');
        body.push_str(&"y".repeat(50));

        let err = GatewayError::provider_error(body.clone());
        let GatewayError::ProviderError(message) = err else {
            panic!("expected ProviderError");
        };
        assert!(message.is_char_boundary(message.len() - '…'.len_utf8()));

        let transient = classify(Some(503), &body);
        assert!(matches!(transient, GatewayError::Transient(_)));
    }
}
