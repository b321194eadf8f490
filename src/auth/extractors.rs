//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

use super::models::User;
use crate::common::AuthError;

/// The user resolved by [`require_session`](super::middleware::require_session).
///
/// Only usable on routes behind that middleware; anywhere else the request
/// is rejected as unauthenticated.
#[derive(Debug, Clone)]
pub struct SessionUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<SessionUser>() {
            Some(user) => Ok(user.clone()),
            None => {
                error!(uri = %parts.uri, "SessionUser requested on a route without session middleware");
                Err(AuthError::missing_token())
            }
        }
    }
}
