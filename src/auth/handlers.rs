//! Authentication handlers

use axum::{
    extract::{rejection::JsonRejection, Extension, Json},
    http::{header::SET_COOKIE, HeaderMap},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::extractors::SessionUser;
use super::middleware::{clear_session_cookie, session_cookie, session_cookie_value};
use super::models::{RawTokenResponse, SessionResponse, SignInRequest, SignInResponse};
use crate::common::{safe_optional_email_log, AppState, AuthError, AuthErrorKind};
use crate::services::reconciler::SignInResult;

/// POST /api/auth/sign-in
/// Verifies a provider response, reconciles it to a user and issues a session
///
/// # Request Body
/// ```json
/// {
///   "provider": "google" | "github" | "apple",
///   "response": { "type": "success", "url": "...", "params": { ... }, "authentication": { ... } }
/// }
/// ```
///
/// # Response
/// ```json
/// {
///   "user": { ... },
///   "token": "<jwt token>"
/// }
/// ```
/// The token is also set as the session cookie for web clients.
pub async fn sign_in_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Malformed sign-in request");
        AuthError::BadRequest("malformed sign-in request".to_string())
    })?;
    let provider = request.provider;

    info!(provider = %provider, "🔐 Received sign-in request");

    let signed_in = match verify_and_reconcile(&state, &request).await {
        Ok(signed_in) => signed_in,
        Err(e) => {
            if e.kind() == AuthErrorKind::Internal {
                error!(provider = %provider, error = %e, "Sign-in failed unexpectedly");
            } else {
                warn!(
                    provider = %provider,
                    kind = e.kind().as_str(),
                    error = %e,
                    "Sign-in rejected"
                );
            }
            return Err(e);
        }
    };

    info!(
        user_id = %signed_in.user.id,
        provider = %provider,
        outcome = signed_in.outcome.as_str(),
        "User sign-in successful"
    );

    let cookie = session_cookie(&state.config, &signed_in.token);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(SignInResponse {
            user: signed_in.user,
            token: signed_in.token,
        }),
    ))
}

async fn verify_and_reconcile(
    state: &AppState,
    request: &SignInRequest,
) -> Result<SignInResult, AuthError> {
    let identity = state
        .registry
        .verify(request.provider, &request.response)
        .await?;
    debug!(
        provider = %request.provider,
        provider_account_id = %identity.provider_account_id,
        email = %safe_optional_email_log(identity.email.as_deref()),
        "Provider identity verified"
    );
    state.reconciler.reconcile(&identity).await
}

/// GET /api/auth/session
/// Returns the user behind the presented session token
pub async fn session_handler(SessionUser(user): SessionUser) -> Json<SessionResponse> {
    Json(SessionResponse { user })
}

/// POST /api/auth/refresh
/// Mints a new token with a fresh expiry for the current session
pub async fn refresh_handler(
    Extension(state): Extension<Arc<AppState>>,
    SessionUser(user): SessionUser,
) -> Result<impl IntoResponse, AuthError> {
    let token = state.tokens.mint(&user)?;
    info!(user_id = %user.id, "Session token refreshed");

    let cookie = session_cookie(&state.config, &token);
    Ok(([(SET_COOKIE, cookie)], Json(SignInResponse { user, token })))
}

/// POST /api/auth/sign-out
/// Clears the session cookie. Tokens are stateless, so a copy held
/// elsewhere stays valid until it expires.
pub async fn sign_out_handler(
    Extension(state): Extension<Arc<AppState>>,
    SessionUser(user): SessionUser,
) -> impl IntoResponse {
    info!(user_id = %user.id, "User sign-out");
    (
        [(SET_COOKIE, clear_session_cookie(&state.config))],
        Json(SessionResponse { user }),
    )
}

/// GET /api/auth/jwt
/// Hands the raw cookie token to web clients that need to pass it on
pub async fn raw_token_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<RawTokenResponse> {
    let token = session_cookie_value(&headers, &state.config.session_cookie_name);
    debug!(has_token = token.is_some(), "Raw session token requested");
    Json(RawTokenResponse { token })
}
