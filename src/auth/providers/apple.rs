//! Sign in with Apple
//!
//! The device flow is attested by the platform, so the identity token is
//! validated locally against the configured issuer and client id. No call
//! leaves the process.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{decode_unverified_claims, non_empty};
use crate::auth::models::{IdentityArtifacts, NormalizedIdentity, Provider, RawProviderResponse};
use crate::common::{safe_optional_email_log, AuthConfig, AuthError};

#[derive(Debug, Deserialize)]
struct AppleIdentityClaims {
    iss: Option<String>,
    aud: Option<String>,
    sub: Option<String>,
    exp: Option<i64>,
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullName {
    given_name: Option<String>,
    middle_name: Option<String>,
    family_name: Option<String>,
    nickname: Option<String>,
}

impl FullName {
    fn display(self) -> Option<String> {
        let parts: Vec<String> = [self.given_name, self.middle_name, self.family_name]
            .into_iter()
            .filter_map(non_empty)
            .collect();
        if parts.is_empty() {
            non_empty(self.nickname)
        } else {
            Some(parts.join(" "))
        }
    }
}

pub struct AppleVerifier {
    config: Arc<AuthConfig>,
}

impl AppleVerifier {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }

    pub async fn verify(&self, raw: &RawProviderResponse) -> Result<NormalizedIdentity, AuthError> {
        self.verify_at(raw, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        raw: &RawProviderResponse,
        now: i64,
    ) -> Result<NormalizedIdentity, AuthError> {
        let (authorization_code, identity_token) =
            match (raw.param_str("authorizationCode"), raw.param_str("identityToken")) {
                (Some(code), Some(token)) => (code, token),
                (code, token) => {
                    warn!(
                        has_authorization_code = code.is_some(),
                        has_identity_token = token.is_some(),
                        "Apple response missing required credentials"
                    );
                    return Err(AuthError::MissingCredential(
                        "Apple sign-in requires an authorization code and identity token"
                            .to_string(),
                    ));
                }
            };

        let client_id = self.config.apple.client_id.as_deref().ok_or_else(|| {
            warn!("APPLE_CLIENT_ID not configured - rejecting Apple sign-in");
            AuthError::Forbidden("Apple sign-in is not configured".to_string())
        })?;

        let claims: AppleIdentityClaims = decode_unverified_claims(Provider::Apple, identity_token)?;

        if claims.iss.as_deref() != Some(self.config.apple.issuer.as_str()) {
            warn!(token_issuer = ?claims.iss, "Apple identity token issuer mismatch");
            return Err(AuthError::Forbidden("issuer not accepted".to_string()));
        }

        if claims.aud.as_deref() != Some(client_id) {
            warn!(
                token_audience = ?claims.aud,
                expected_client_id = %client_id,
                "Apple identity token audience mismatch"
            );
            return Err(AuthError::Forbidden("audience mismatch".to_string()));
        }

        match claims.exp {
            Some(exp) if exp >= now => {}
            exp => {
                warn!(token_exp = ?exp, now = now, "Apple identity token expired or undated");
                return Err(AuthError::Forbidden("identity token expired".to_string()));
            }
        }

        let sub = non_empty(claims.sub).ok_or_else(|| {
            warn!("Apple identity token has no subject");
            AuthError::InvalidResponse("Invalid Response".to_string())
        })?;

        // the device reports the same stable user identifier it put in the token
        if let Some(user) = raw.param_str("user") {
            if user != sub {
                warn!(token_subject = %sub, "Apple credential user does not match token subject");
                return Err(AuthError::Forbidden("subject mismatch".to_string()));
            }
        }

        // Apple only shares email and name on the first authorization.
        // The device-reported email is never used on its own.
        let email = non_empty(claims.email);
        if let Some(reported) = raw.param_str("email") {
            if email.as_deref() != Some(reported) {
                warn!(
                    token_email = %safe_optional_email_log(email.as_deref()),
                    reported_email = %safe_optional_email_log(Some(reported)),
                    "Apple credential email does not match identity token"
                );
                return Err(AuthError::Forbidden("email mismatch".to_string()));
            }
        }
        let name = raw
            .param_value("fullName")
            .cloned()
            .and_then(|v: Value| serde_json::from_value::<FullName>(v).ok())
            .and_then(FullName::display);

        debug!(
            provider = "apple",
            provider_id = %sub,
            email = %safe_optional_email_log(email.as_deref()),
            has_authorization_code = !authorization_code.is_empty(),
            "Apple identity token validated"
        );

        Ok(NormalizedIdentity {
            provider: Provider::Apple,
            provider_account_id: sub,
            email,
            name,
            picture_url: None,
            artifacts: IdentityArtifacts {
                access_token: None,
                id_token: Some(identity_token.to_string()),
                token_type: Some("bearer".to_string()),
                scope: Some("name email".to_string()),
            },
        })
    }
}
