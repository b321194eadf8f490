//! Fixtures shared by provider and handler tests

use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tokio::net::TcpListener;

use crate::auth::models::RawProviderResponse;
use crate::common::AuthConfig;

pub(crate) const CALLBACK_URL: &str = "exp://127.0.0.1:19000/--/expo-auth-session";
pub(crate) const GOOGLE_CLIENT_ID: &str = "google-client.apps.googleusercontent.com";
pub(crate) const APPLE_CLIENT_ID: &str = "com.example.app";

/// Configuration pointing every provider endpoint at `base_url`
pub(crate) fn fixture_config(base_url: &str) -> AuthConfig {
    let base = base_url.trim_end_matches('/').to_string();
    AuthConfig::from_lookup(move |key| {
        let value = match key {
            "JWT_SECRET" => "test_secret_key".to_string(),
            "CALLBACK_URL_PREFIXES" => "exp://127.0.0.1:19000".to_string(),
            "PROVIDER_TIMEOUT_SECS" => "5".to_string(),
            "SESSION_COOKIE_SECURE" => "false".to_string(),
            "GOOGLE_CLIENT_ID" => GOOGLE_CLIENT_ID.to_string(),
            "GOOGLE_TOKENINFO_URL" => format!("{}/tokeninfo", base),
            "GITHUB_ID" => "github-id".to_string(),
            "GITHUB_SECRET" => "github-secret".to_string(),
            "GITHUB_TOKEN_URL" => format!("{}/login/oauth/access_token", base),
            "GITHUB_API_URL" => base.clone(),
            "APPLE_CLIENT_ID" => APPLE_CLIENT_ID.to_string(),
            _ => return None,
        };
        Some(value)
    })
    .unwrap()
}

pub(crate) fn raw_response(value: Value) -> RawProviderResponse {
    serde_json::from_value(value).unwrap()
}

/// A JWT signed with a throwaway key; only its payload matters to the verifiers
pub(crate) fn unsigned_jwt(claims: &Value) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(b"provider-signing-key"),
    )
    .unwrap()
}

/// Serve `router` on an ephemeral local port and return its base URL
pub(crate) async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}
