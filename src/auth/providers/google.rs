//! Google sign-in verification
//!
//! The client hands over both the ID token and the access token from its
//! OpenID flow. The access token is introspected with Google's tokeninfo
//! endpoint and the ID token is decoded locally; the two claim sets must
//! agree with each other and with this deployment's client id.
//! Docs: https://developers.google.com/identity/sign-in/web/backend-auth

use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    decode_unverified_claims, malformed_body, non_empty, require_callback, transport_failure,
};
use crate::auth::models::{IdentityArtifacts, NormalizedIdentity, Provider, RawProviderResponse};
use crate::common::{safe_optional_email_log, AuthConfig, AuthError};

const DEFAULT_SCOPE: &str =
    "https://www.googleapis.com/auth/userinfo.profile openid https://www.googleapis.com/auth/userinfo.email";

/// Claims read from the client-supplied ID token
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: Option<String>,
    aud: Option<String>,
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Authoritative claims from the tokeninfo endpoint
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    sub: Option<String>,
    email: Option<String>,
    scope: Option<String>,
}

pub struct GoogleVerifier {
    config: Arc<AuthConfig>,
    http: Client,
}

impl GoogleVerifier {
    pub fn new(config: Arc<AuthConfig>, http: Client) -> Self {
        Self { config, http }
    }

    pub async fn verify(&self, raw: &RawProviderResponse) -> Result<NormalizedIdentity, AuthError> {
        let authentication = raw.authentication.clone().unwrap_or_default();
        let id_token = non_empty(authentication.id_token);
        let access_token = non_empty(authentication.access_token);

        let (id_token, access_token) = match (id_token, access_token) {
            (Some(id), Some(access)) => (id, access),
            (id, access) => {
                warn!(
                    has_id_token = id.is_some(),
                    has_access_token = access.is_some(),
                    "Google response missing required tokens"
                );
                return Err(AuthError::MissingCredential(
                    "Google sign-in requires an ID token and an access token".to_string(),
                ));
            }
        };

        let client_id = match self.config.google.client_id.as_deref() {
            Some(id) => id,
            None => {
                warn!("GOOGLE_CLIENT_ID not configured - rejecting Google sign-in");
                return Err(AuthError::Forbidden("Google sign-in is not configured".to_string()));
            }
        };

        let verified = self.introspect(&access_token).await?;
        let decoded: IdTokenClaims = decode_unverified_claims(Provider::Google, &id_token)?;

        let issuer_ok = decoded
            .iss
            .as_deref()
            .map_or(false, |iss| self.config.google.allowed_issuers.contains(iss));
        if !issuer_ok {
            warn!(token_issuer = ?decoded.iss, "Google token issuer not accepted");
            return Err(AuthError::Forbidden("issuer not accepted".to_string()));
        }

        if decoded.aud.as_deref() != Some(client_id) || verified.aud.as_deref() != Some(client_id) {
            warn!(
                token_audience = ?decoded.aud,
                introspected_audience = ?verified.aud,
                expected_client_id = %client_id,
                "Google token audience validation failed - rejecting token"
            );
            return Err(AuthError::Forbidden("audience mismatch".to_string()));
        }

        require_callback(&self.config, Provider::Google, &raw.url)?;

        let sub = match non_empty(decoded.sub) {
            Some(sub) => sub,
            None => {
                warn!("Google ID token has no subject");
                return Err(AuthError::InvalidResponse("Invalid Response".to_string()));
            }
        };

        if verified.sub.as_deref() != Some(sub.as_str()) {
            warn!(
                token_subject = %sub,
                introspected_subject = ?verified.sub,
                "Google token subject mismatch"
            );
            return Err(AuthError::Forbidden("subject mismatch".to_string()));
        }

        // The ID token is unsigned here; only the introspected email links accounts
        let email = non_empty(verified.email);
        if let Some(claimed) = non_empty(decoded.email) {
            if email.as_deref() != Some(claimed.as_str()) {
                warn!(
                    token_email = %safe_optional_email_log(Some(claimed.as_str())),
                    introspected_email = %safe_optional_email_log(email.as_deref()),
                    "Google token email mismatch"
                );
                return Err(AuthError::Forbidden("email mismatch".to_string()));
            }
        }

        debug!(
            provider = "google",
            provider_id = %sub,
            email = %safe_optional_email_log(email.as_deref()),
            "Google token validation successful"
        );

        Ok(NormalizedIdentity {
            provider: Provider::Google,
            provider_account_id: sub,
            email,
            name: non_empty(decoded.name),
            picture_url: non_empty(decoded.picture),
            artifacts: IdentityArtifacts {
                access_token: Some(access_token),
                id_token: Some(id_token),
                token_type: Some(
                    non_empty(authentication.token_type).unwrap_or_else(|| "Bearer".to_string()),
                ),
                scope: Some(
                    non_empty(authentication.scope)
                        .or_else(|| non_empty(verified.scope))
                        .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
                ),
            },
        })
    }

    async fn introspect(&self, access_token: &str) -> Result<TokenInfo, AuthError> {
        debug!("Initiating Google token validation with tokeninfo endpoint");

        let response = self
            .http
            .get(&self.config.google.tokeninfo_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| transport_failure(Provider::Google, "tokeninfo", e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(http_status = %status, "Google tokeninfo returned error status");
            return Err(AuthError::Forbidden("access token rejected by Google".to_string()));
        }

        response
            .json::<TokenInfo>()
            .await
            .map_err(|e| malformed_body(Provider::Google, "tokeninfo", e))
    }
}
