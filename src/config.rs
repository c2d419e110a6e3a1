//! Configuration surface recognized by the gateway: secret wrapping for the
//! credential, plus the resolution and fallback knobs the gateway needs,
//! narrowed to exactly the options it recognizes.

use std::time::Duration;

use secrecy::SecretString;

use crate::types::ReasoningEffort;

/// One resolved provider's configuration, as recognized by the gateway.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Endpoint root; no trailing slash required.
    pub base_url: String,
    /// Credential string. Wrapped so it never prints in `Debug` output.
    pub api_key: SecretString,
    /// Primary model id.
    pub model: String,
    /// Explicit provider override. `None` means auto-resolve via
    /// [`crate::resolver::resolve`].
    pub provider: Option<String>,
    /// Ordered list of alternates, attempted in order after the primary
    /// fails or times out.
    pub fallback_models: Vec<String>,
    /// Per-attempt deadline used when `fallback_models` is non-empty.
    pub fallback_timeout: Option<Duration>,
    pub reasoning_effort: ReasoningEffort,
    /// Global HTTP timeout, used when no fallback timeout applies.
    pub http_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        ProviderConfig {
            base_url: base_url.into(),
            api_key: SecretString::from(api_key.into()),
            model: model.into(),
            provider: None,
            fallback_models: Vec::new(),
            fallback_timeout: None,
            reasoning_effort: ReasoningEffort::Off,
            http_timeout: Duration::from_secs(60),
        }
    }

    /// The timeout to use for a single attempt: the configured fallback
    /// timeout when fallbacks are present, otherwise the global timeout.
    pub fn effective_attempt_timeout(&self) -> Duration {
        if !self.fallback_models.is_empty() {
            self.fallback_timeout.unwrap_or(self.http_timeout)
        } else {
            self.http_timeout
        }
    }

    pub fn validate(&self) -> Result<(), crate::error::GatewayError> {
        use crate::error::GatewayError;
        use secrecy::ExposeSecret;

        if self.model.trim().is_empty() {
            return Err(GatewayError::ConfigError("model must not be empty".to_string()));
        }
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(GatewayError::ConfigError("apiKey must not be empty".to_string()));
        }
        Ok(())
    }
}
