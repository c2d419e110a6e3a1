//! Optional OAuth credential carried alongside a provider's regular API key.
//!
//! The gateway doesn't perform any authentication flow itself — callers
//! obtain a token elsewhere and hand it in. When one is present, it switches
//! the Anthropic branch to the OAuth wire contract: `Authorization: Bearer`
//! instead of `x-api-key`, plus the array-of-blocks system prompt encoding in
//! [`crate::provider::anthropic::build_request`].

use secrecy::{ExposeSecret, SecretString};

/// An OAuth access token for the Anthropic Messages API.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub(crate) access_token: SecretString,
}

impl OAuthCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        OAuthCredentials {
            access_token: SecretString::from(access_token.into()),
        }
    }

    pub(crate) fn expose(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials").field("access_token", &"<redacted>").finish()
    }
}
