//! Authentication routes

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::handlers;
use super::middleware::require_session;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/sign-in` - Provider sign-in, issues a session token
/// - `GET /api/auth/jwt` - Raw session token from the cookie
/// - `GET /api/auth/session` - Current session user (protected)
/// - `POST /api/auth/refresh` - Re-issue the session token (protected)
/// - `POST /api/auth/sign-out` - Clear the session cookie (protected)
pub fn auth_routes() -> Router {
    let protected = Router::new()
        .route("/api/auth/session", get(handlers::session_handler))
        .route("/api/auth/refresh", post(handlers::refresh_handler))
        .route("/api/auth/sign-out", post(handlers::sign_out_handler))
        .route_layer(middleware::from_fn(require_session));

    Router::new()
        .route("/api/auth/sign-in", post(handlers::sign_in_handler))
        .route("/api/auth/jwt", get(handlers::raw_token_handler))
        .merge(protected)
}
