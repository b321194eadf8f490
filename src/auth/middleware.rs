//! Session middleware and cookie helpers
//!
//! Web clients carry the session token in a first-party cookie; mobile
//! clients send it as `Authorization: Bearer <token>`. A request that is
//! already cookie-authenticated uses the cookie, otherwise the header.

use axum::{
    extract::{Extension, Request},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap,
    },
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::extractors::SessionUser;
use crate::common::{safe_token_log, AppState, AuthConfig, AuthError};

/// Pick the single session token a request presents, if any
pub fn resolve_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    session_cookie_value(headers, cookie_name).or_else(|| bearer_token(headers))
}

/// Value of the named cookie from the `Cookie` header(s)
pub fn session_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|part| part.trim().strip_prefix(prefix.as_str()))
        .map(str::to_string)
        .find(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    // Handle "Bearer <token>" format or raw token
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// `Set-Cookie` value carrying a freshly minted session token
pub fn session_cookie(config: &AuthConfig, token: &str) -> String {
    let secure_flag = if config.session_cookie_secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly{}; SameSite=Lax; Path=/; Max-Age={}",
        config.session_cookie_name, token, secure_flag, config.session_ttl_seconds
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(config: &AuthConfig) -> String {
    let secure_flag = if config.session_cookie_secure { "; Secure" } else { "" };
    format!(
        "{}=; HttpOnly{}; SameSite=Lax; Path=/; Max-Age=0",
        config.session_cookie_name, secure_flag
    )
}

/// Fail-closed gate in front of protected routes.
///
/// On success the resolved user is stored in request extensions as
/// [`SessionUser`]; on failure the request never reaches the handler.
pub async fn require_session(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = resolve_token(request.headers(), &state.config.session_cookie_name);

    let user = match state.tokens.validate(token.as_deref()).await {
        Ok(user) => user,
        Err(e) => {
            warn!(
                method = %request.method(),
                uri = %request.uri(),
                token = %token.as_deref().map(safe_token_log).unwrap_or_else(|| "<none>".to_string()),
                reason = %e,
                "Rejected unauthenticated request"
            );
            return Err(e);
        }
    };

    debug!(user_id = %user.id, uri = %request.uri(), "Session resolved");
    request.extensions_mut().insert(SessionUser(user));
    Ok(next.run(request).await)
}
