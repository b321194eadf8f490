//! Provider verifiers
//!
//! Each verifier turns a raw client-side provider response into a
//! [`NormalizedIdentity`] or fails with exactly one [`AuthError`] kind.
//! Network failures and timeouts are reported as `Forbidden`; nothing is
//! retried here.

pub mod apple;
pub mod github;
pub mod google;

#[cfg(test)]
pub(crate) mod test_support;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::models::{NormalizedIdentity, Provider, RawProviderResponse, ResponseOutcome};
use crate::common::{AuthConfig, AuthError};

pub use apple::AppleVerifier;
pub use github::GithubVerifier;
pub use google::GoogleVerifier;

/// One verifier per provider. Adding a provider means adding a variant,
/// and every match below stops compiling until it is handled.
pub enum ProviderVerifier {
    Google(GoogleVerifier),
    Github(GithubVerifier),
    Apple(AppleVerifier),
}

impl ProviderVerifier {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderVerifier::Google(_) => Provider::Google,
            ProviderVerifier::Github(_) => Provider::Github,
            ProviderVerifier::Apple(_) => Provider::Apple,
        }
    }

    pub async fn verify(&self, raw: &RawProviderResponse) -> Result<NormalizedIdentity, AuthError> {
        ensure_completed(self.provider(), raw)?;

        match self {
            ProviderVerifier::Google(v) => v.verify(raw).await,
            ProviderVerifier::Github(v) => v.verify(raw).await,
            ProviderVerifier::Apple(v) => v.verify(raw).await,
        }
    }
}

/// Static provider name -> verifier table
pub struct ProviderRegistry {
    google: ProviderVerifier,
    github: ProviderVerifier,
    apple: ProviderVerifier,
}

impl ProviderRegistry {
    /// Build every verifier around one HTTP client with the configured timeout
    pub fn new(config: Arc<AuthConfig>) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.provider_timeout).build()?;

        Ok(Self {
            google: ProviderVerifier::Google(GoogleVerifier::new(config.clone(), http.clone())),
            github: ProviderVerifier::Github(GithubVerifier::new(config.clone(), http)),
            apple: ProviderVerifier::Apple(AppleVerifier::new(config)),
        })
    }

    pub fn verifier(&self, provider: Provider) -> &ProviderVerifier {
        match provider {
            Provider::Google => &self.google,
            Provider::Github => &self.github,
            Provider::Apple => &self.apple,
        }
    }

    pub async fn verify(
        &self,
        provider: Provider,
        raw: &RawProviderResponse,
    ) -> Result<NormalizedIdentity, AuthError> {
        self.verifier(provider).verify(raw).await
    }
}

/// Only a completed provider flow carries credentials
fn ensure_completed(provider: Provider, raw: &RawProviderResponse) -> Result<(), AuthError> {
    if raw.outcome == ResponseOutcome::Success {
        return Ok(());
    }

    warn!(
        provider = %provider,
        outcome = ?raw.outcome,
        error_code = ?raw.error_code(),
        error_description = ?raw.error.as_ref().and_then(|e| e.description.as_deref().or(e.message.as_deref())),
        "Provider flow did not complete"
    );
    Err(AuthError::MissingCredential(format!(
        "{} sign-in did not complete",
        provider
    )))
}

/// Decode a JWT payload without checking its signature.
///
/// Callers cross-check the claims against the provider or against local
/// configuration before trusting any of them.
pub(crate) fn decode_unverified_claims<T: DeserializeOwned>(
    provider: Provider,
    token: &str,
) -> Result<T, AuthError> {
    let malformed = |reason: &str| {
        warn!(provider = %provider, reason = reason, "Malformed identity token");
        AuthError::Forbidden(format!("malformed {} identity token", provider))
    };

    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(malformed("expected three segments")),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| malformed("payload is not base64url"))?;

    serde_json::from_slice(&bytes).map_err(|_| malformed("payload is not a claims object"))
}

/// Timeout or connection failure talking to a provider
pub(crate) fn transport_failure(provider: Provider, endpoint: &str, err: reqwest::Error) -> AuthError {
    warn!(
        provider = %provider,
        endpoint = endpoint,
        timeout = err.is_timeout(),
        error = %err,
        "HTTP error contacting identity provider"
    );
    AuthError::Forbidden(format!("{} {} request failed", provider, endpoint))
}

/// Provider answered with a body we could not parse
pub(crate) fn malformed_body(provider: Provider, endpoint: &str, err: reqwest::Error) -> AuthError {
    warn!(provider = %provider, endpoint = endpoint, error = %err, "Unparseable provider response");
    AuthError::InvalidResponse(format!("{} {} response malformed", provider, endpoint))
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) fn require_callback(
    config: &AuthConfig,
    provider: Provider,
    url: &str,
) -> Result<(), AuthError> {
    if config.is_registered_callback(url) {
        debug!(provider = %provider, "Callback URL matches a registered prefix");
        Ok(())
    } else {
        warn!(provider = %provider, callback_url = %url, "Callback URL is not registered");
        Err(AuthError::Forbidden("callback URL not registered".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{fixture_config, raw_response, unsigned_jwt};
    use super::*;
    use crate::common::AuthErrorKind;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct SubOnly {
        sub: Option<String>,
    }

    #[test]
    fn test_registry_dispatch_is_total() {
        let registry = ProviderRegistry::new(Arc::new(fixture_config("http://127.0.0.1:9"))).unwrap();
        for provider in Provider::ALL {
            assert_eq!(registry.verifier(provider).provider(), provider);
        }
    }

    #[tokio::test]
    async fn test_incomplete_flows_are_missing_credentials() {
        let registry = ProviderRegistry::new(Arc::new(fixture_config("http://127.0.0.1:9"))).unwrap();

        for outcome in ["cancel", "error", "locked", "dismiss"] {
            let raw = raw_response(json!({
                "type": outcome,
                "errorCode": "user_cancelled",
                "url": "exp://127.0.0.1:19000/--/expo-auth-session",
            }));
            for provider in Provider::ALL {
                let err = registry.verify(provider, &raw).await.unwrap_err();
                assert_eq!(err.kind(), AuthErrorKind::MissingCredential, "{} {}", provider, outcome);
            }
        }
    }

    #[test]
    fn test_decode_unverified_claims() {
        let token = unsigned_jwt(&json!({ "sub": "abc", "iss": "x" }));
        let claims: SubOnly = decode_unverified_claims(Provider::Google, &token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("abc"));

        for bad in ["", "only.two", "a.!!!.c", "a.b.c.d"] {
            let err = decode_unverified_claims::<SubOnly>(Provider::Google, bad).unwrap_err();
            assert_eq!(err.kind(), AuthErrorKind::Forbidden, "{:?}", bad);
        }
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some(" x ".to_string())), Some("x".to_string()));
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(None), None);
    }
}
