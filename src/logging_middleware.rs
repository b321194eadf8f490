// src/logging_middleware.rs
//! Middleware for logging request and response bodies in debug mode
//!
//! Sign-in bodies carry provider credentials and responses carry session
//! tokens, so JSON bodies are redacted before they are logged.

use axum::body::to_bytes;
use axum::{body::Body, extract::Request, http::StatusCode, middleware::Next, response::Response};
use serde_json::Value;
use tracing::debug;

/// JSON keys whose values never reach the logs
const REDACTED_KEYS: [&str; 6] = [
    "accessToken",
    "idToken",
    "identityToken",
    "authorizationCode",
    "code",
    "token",
];

/// Middleware to log request and response bodies in debug mode
pub async fn log_request_response(request: Request, next: Next) -> Result<Response, StatusCode> {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();

    // Read request body
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(logged) = loggable_body(&bytes) {
        debug!(
            method = %parts.method,
            uri = %parts.uri,
            request_body = %logged,
            "📥 Request"
        );
    }

    // Reconstruct request
    let request = Request::from_parts(parts, Body::from(bytes));

    let response = next.run(request).await;

    let (parts, body) = response.into_parts();

    // Read response body
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(logged) = loggable_body(&bytes) {
        debug!(
            status = %parts.status,
            response_body = %logged,
            "📤 Response"
        );
    }

    // Reconstruct response
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

/// Pretty JSON with credentials redacted. Non-JSON bodies are not logged,
/// since they cannot be redacted.
fn loggable_body(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let mut json = serde_json::from_slice::<Value>(bytes).ok()?;
    redact(&mut json);
    serde_json::to_string_pretty(&json).ok()
}

fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if REDACTED_KEYS.contains(&key.as_str()) && !field.is_null() {
                    *field = Value::String("[REDACTED]".to_string());
                } else {
                    redact(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_nested_credentials() {
        let mut body = json!({
            "provider": "apple",
            "response": {
                "type": "success",
                "params": {
                    "authorizationCode": "c0de",
                    "identityToken": "eyJ.x.y",
                    "email": "ada@example.com",
                },
                "authentication": { "accessToken": "ya29", "idToken": null },
            },
            "tokens": [{ "token": "t1" }],
        });

        redact(&mut body);

        assert_eq!(body["provider"], "apple");
        assert_eq!(body["response"]["params"]["authorizationCode"], "[REDACTED]");
        assert_eq!(body["response"]["params"]["identityToken"], "[REDACTED]");
        assert_eq!(body["response"]["params"]["email"], "ada@example.com");
        assert_eq!(body["response"]["authentication"]["accessToken"], "[REDACTED]");
        assert!(body["response"]["authentication"]["idToken"].is_null());
        assert_eq!(body["tokens"][0]["token"], "[REDACTED]");
    }

    #[test]
    fn test_non_json_bodies_are_not_logged() {
        assert_eq!(loggable_body(b""), None);
        assert_eq!(loggable_body(b"session-token=abc"), None);

        let logged = loggable_body(br#"{"token":"abc","user":{"id":"U_1"}}"#).unwrap();
        assert!(!logged.contains("abc"));
        assert!(logged.contains("U_1"));
    }
}
