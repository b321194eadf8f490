// src/services/token.rs
//! Session token minting and validation.
//!
//! Tokens are stateless HS256 JWTs. Possession of a token with a valid
//! signature, an unexpired `exp` and a `sub` that still resolves to a user
//! is a valid session; nothing is stored server-side.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::auth::models::{Claims, User};
use crate::common::{AuthConfig, AuthError};
use crate::services::user_store::{StoreError, UserStore};

#[derive(Clone)]
pub struct TokenService {
    config: Arc<AuthConfig>,
    store: Arc<dyn UserStore>,
}

impl TokenService {
    pub fn new(config: Arc<AuthConfig>, store: Arc<dyn UserStore>) -> Self {
        Self { config, store }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.config.session_ttl_seconds
    }

    /// Mint a session token for `user`, expiring one TTL from now
    pub fn mint(&self, user: &User) -> Result<String, AuthError> {
        self.mint_at(user, Utc::now().timestamp())
    }

    pub fn mint_at(&self, user: &User, now: i64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            picture: user.picture_url.clone(),
            iat: now,
            exp: now + self.config.session_ttl_seconds,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "JWT encoding error");
            AuthError::Internal("jwt error".to_string())
        })
    }

    /// Check the signature and decode claims. Expiry is not checked here.
    pub fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is compared against an explicit clock in validate_at
        validation.validate_exp = false;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            warn!(error = %e, "JWT token validation failed");
            AuthError::invalid_token()
        })
    }

    /// Validate a presented token and resolve its user
    pub async fn validate(&self, token: Option<&str>) -> Result<User, AuthError> {
        self.validate_at(token, Utc::now().timestamp()).await
    }

    pub async fn validate_at(&self, token: Option<&str>, now: i64) -> Result<User, AuthError> {
        let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t,
            None => return Err(AuthError::missing_token()),
        };

        let claims = self.decode_claims(token)?;

        if claims.exp < now {
            debug!(user_id = %claims.sub, exp = claims.exp, now = now, "Session token expired");
            return Err(AuthError::token_expired());
        }

        match self.store.get_user_by_id(&claims.sub).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => {
                warn!(user_id = %claims.sub, "Session token subject no longer exists");
                Err(AuthError::Unauthorized("User not found".to_string()))
            }
            Err(e) => {
                error!(error = %e, user_id = %claims.sub, "Store error resolving session subject");
                Err(AuthError::invalid_token())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::NewUser;
    use crate::common::AuthErrorKind;
    use crate::services::user_store::memory_store;

    fn test_config(ttl: i64) -> Arc<AuthConfig> {
        let mut config =
            AuthConfig::from_lookup(|key| (key == "JWT_SECRET").then(|| "test_secret_key".to_string()))
                .unwrap();
        config.session_ttl_seconds = ttl;
        Arc::new(config)
    }

    async fn service_with_user(ttl: i64) -> (TokenService, User) {
        let store = memory_store().await;
        let user = store
            .create_user(NewUser {
                name: Some("Test User".to_string()),
                email: Some("test@example.com".to_string()),
                picture_url: Some("https://example.com/a.png".to_string()),
                email_verified_at: None,
            })
            .await
            .unwrap();
        (TokenService::new(test_config(ttl), Arc::new(store)), user)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (tokens, user) = service_with_user(3600).await;

        let token = tokens.mint(&user).unwrap();
        let resolved = tokens.validate(Some(&token)).await.unwrap();

        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_claims_carry_profile_and_expiry() {
        let (tokens, user) = service_with_user(3600).await;

        let token = tokens.mint_at(&user, 1_000_000).unwrap();
        let claims = tokens.decode_claims(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email.as_deref(), Some("test@example.com"));
        assert_eq!(claims.name.as_deref(), Some("Test User"));
        assert_eq!(claims.picture.as_deref(), Some("https://example.com/a.png"));
        assert_eq!(claims.iat, 1_000_000);
        assert_eq!(claims.exp, 1_003_600);
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (tokens, user) = service_with_user(60).await;
        let minted_at = 1_700_000_000;
        let exp = minted_at + 60;
        let token = tokens.mint_at(&user, minted_at).unwrap();

        let before = tokens.validate_at(Some(&token), exp - 1).await.unwrap();
        assert_eq!(before.id, user.id);

        let err = tokens.validate_at(Some(&token), exp + 1).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Unauthorized);
        assert_eq!(err.message(), "Token expired");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (tokens, _) = service_with_user(60).await;

        for token in [None, Some(""), Some("   ")] {
            let err = tokens.validate(token).await.unwrap_err();
            assert_eq!(err.message(), "Missing token");
        }
    }

    #[tokio::test]
    async fn test_wrong_secret_and_garbage_are_invalid() {
        let (tokens, user) = service_with_user(60).await;
        let other = TokenService::new(
            Arc::new(AuthConfig {
                jwt_secret: "wrong_secret_key".to_string(),
                ..(*test_config(60)).clone()
            }),
            tokens.store.clone(),
        );

        let forged = other.mint(&user).unwrap();
        let err = tokens.validate(Some(&forged)).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Unauthorized);
        assert_eq!(err.message(), "Invalid token");

        let err = tokens.validate(Some("not.a.jwt")).await.unwrap_err();
        assert_eq!(err.message(), "Invalid token");
    }

    #[tokio::test]
    async fn test_unknown_subject_is_unauthorized() {
        let (tokens, _) = service_with_user(60).await;
        let ghost = User {
            id: "U_GHOST".to_string(),
            name: None,
            email: None,
            picture_url: None,
            email_verified_at: None,
            created_at: None,
        };

        let token = tokens.mint(&ghost).unwrap();
        let err = tokens.validate(Some(&token)).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Unauthorized);
    }
}
