//! GitHub OAuth code exchange
//!
//! The device finishes the browser leg and hands us the temporary code. We
//! trade it for an access token, then read the profile (and the private
//! email list when the profile has no public email).

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{malformed_body, non_empty, require_callback, transport_failure};
use crate::auth::models::{IdentityArtifacts, NormalizedIdentity, Provider, RawProviderResponse};
use crate::common::{safe_optional_email_log, AuthConfig, AuthError};

const USER_AGENT: &str = "identity_api";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: Option<String>,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
}

pub struct GithubVerifier {
    config: Arc<AuthConfig>,
    http: Client,
}

impl GithubVerifier {
    pub fn new(config: Arc<AuthConfig>, http: Client) -> Self {
        Self { config, http }
    }

    pub async fn verify(&self, raw: &RawProviderResponse) -> Result<NormalizedIdentity, AuthError> {
        let code = raw.param_str("code").ok_or_else(|| {
            warn!("GitHub response has no authorization code");
            AuthError::MissingCredential("GitHub sign-in requires an authorization code".to_string())
        })?;

        require_callback(&self.config, Provider::Github, &raw.url)?;

        let token = self.exchange_code(code).await?;
        let profile = self.fetch_profile(&token.access_token).await?;

        let email = match non_empty(profile.email) {
            Some(email) => Some(email),
            None => Some(self.fetch_primary_email(&token.access_token).await?),
        };

        let provider_account_id = profile.id.to_string();
        debug!(
            provider = "github",
            provider_id = %provider_account_id,
            email = %safe_optional_email_log(email.as_deref()),
            "GitHub profile resolved"
        );

        Ok(NormalizedIdentity {
            provider: Provider::Github,
            provider_account_id,
            email,
            name: non_empty(profile.name).or_else(|| non_empty(profile.login)),
            picture_url: non_empty(profile.avatar_url),
            artifacts: IdentityArtifacts {
                access_token: Some(token.access_token),
                id_token: None,
                token_type: token.token_type,
                scope: token.scope,
            },
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<ExchangedToken, AuthError> {
        let github = &self.config.github;
        let (client_id, client_secret) =
            match (github.client_id.as_deref(), github.client_secret.as_deref()) {
                (Some(id), Some(secret)) => (id, secret),
                _ => {
                    warn!("GITHUB_ID/GITHUB_SECRET not configured - rejecting GitHub sign-in");
                    return Err(AuthError::Forbidden("GitHub sign-in is not configured".to_string()));
                }
            };

        let response = self
            .http
            .post(&github.token_url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| transport_failure(Provider::Github, "code exchange", e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(http_status = %status, "GitHub code exchange failed");
            return Err(AuthError::Forbidden("GitHub code exchange failed".to_string()));
        }

        let body: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| malformed_body(Provider::Github, "code exchange", e))?;

        // GitHub reports a bad or reused code as 200 with an `error` field
        match non_empty(body.access_token) {
            Some(access_token) => Ok(ExchangedToken {
                access_token,
                token_type: non_empty(body.token_type),
                scope: non_empty(body.scope),
            }),
            None => {
                warn!(error = ?body.error, "GitHub code exchange returned no access token");
                Err(AuthError::Forbidden("GitHub code exchange failed".to_string()))
            }
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<GithubUser, AuthError> {
        let url = format!("{}/user", self.config.github.api_url);
        let response = self
            .authorized(self.http.get(&url), access_token)
            .send()
            .await
            .map_err(|e| transport_failure(Provider::Github, "profile", e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(http_status = %status, "GitHub profile fetch failed");
            return Err(AuthError::Forbidden("GitHub profile fetch failed".to_string()));
        }

        response
            .json::<GithubUser>()
            .await
            .map_err(|e| malformed_body(Provider::Github, "profile", e))
    }

    /// Primary address from the private email list, else the first one
    async fn fetch_primary_email(&self, access_token: &str) -> Result<String, AuthError> {
        debug!("GitHub profile has no public email, listing private emails");

        let url = format!("{}/user/emails", self.config.github.api_url);
        let response = self
            .authorized(self.http.get(&url), access_token)
            .send()
            .await
            .map_err(|e| transport_failure(Provider::Github, "email list", e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(http_status = %status, "GitHub email list fetch failed");
            return Err(AuthError::BadRequest("Cannot fetch user email".to_string()));
        }

        let emails: Vec<GithubEmail> = response
            .json()
            .await
            .map_err(|e| malformed_body(Provider::Github, "email list", e))?;

        let chosen = emails.iter().find(|e| e.primary).or_else(|| emails.first());
        match chosen {
            Some(e) => Ok(e.email.clone()),
            None => {
                warn!("GitHub account has no email addresses");
                Err(AuthError::BadRequest("Cannot fetch user email".to_string()))
            }
        }
    }

    fn authorized(&self, request: RequestBuilder, access_token: &str) -> RequestBuilder {
        request
            .header("Authorization", format!("token {}", access_token))
            .header("Accept", GITHUB_ACCEPT)
            .header("User-Agent", USER_AGENT)
    }
}

struct ExchangedToken {
    access_token: String,
    token_type: Option<String>,
    scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{fixture_config, raw_response, serve, CALLBACK_URL};
    use super::*;
    use crate::common::AuthErrorKind;
    use axum::{
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Form, Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;

    const GOOD_CODE: &str = "good-code";
    const ACCESS: &str = "gho_access";

    struct FakeGithub {
        profile: Value,
        emails: Option<Value>,
    }

    async fn fake_github(fake: FakeGithub) -> String {
        let profile = fake.profile;
        let emails = fake.emails;

        let router = Router::new()
            .route(
                "/login/oauth/access_token",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    let ok = form.get("code").map(String::as_str) == Some(GOOD_CODE)
                        && form.get("client_id").map(String::as_str) == Some("github-id")
                        && form.get("client_secret").map(String::as_str) == Some("github-secret");
                    if ok {
                        Json(json!({
                            "access_token": ACCESS,
                            "token_type": "bearer",
                            "scope": "read:user,user:email",
                        }))
                    } else {
                        Json(json!({ "error": "bad_verification_code" }))
                    }
                }),
            )
            .route(
                "/user",
                get(move |headers: HeaderMap| {
                    let profile = profile.clone();
                    async move {
                        if authorized(&headers) {
                            Json(profile).into_response()
                        } else {
                            StatusCode::UNAUTHORIZED.into_response()
                        }
                    }
                }),
            )
            .route(
                "/user/emails",
                get(move |headers: HeaderMap| {
                    let emails = emails.clone();
                    async move {
                        match emails {
                            Some(list) if authorized(&headers) => Json(list).into_response(),
                            _ => StatusCode::NOT_FOUND.into_response(),
                        }
                    }
                }),
            );
        serve(router).await
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|v| v.to_str().ok())
            == Some(format!("token {}", ACCESS).as_str())
    }

    fn profile(email: Option<&str>) -> Value {
        json!({
            "id": 583231,
            "login": "octocat",
            "name": "The Octocat",
            "email": email,
            "avatar_url": "https://avatars.githubusercontent.com/u/583231",
        })
    }

    fn response(code: &str) -> RawProviderResponse {
        raw_response(json!({
            "type": "success",
            "url": format!("{}?code={}", CALLBACK_URL, code),
            "params": { "code": code, "state": "xyz" },
        }))
    }

    fn verifier(base: &str) -> GithubVerifier {
        GithubVerifier::new(Arc::new(fixture_config(base)), Client::new())
    }

    #[tokio::test]
    async fn test_public_email_profile() {
        let base = fake_github(FakeGithub {
            profile: profile(Some("octocat@github.com")),
            emails: None,
        })
        .await;

        let identity = verifier(&base).verify(&response(GOOD_CODE)).await.unwrap();

        assert_eq!(identity.provider, Provider::Github);
        assert_eq!(identity.provider_account_id, "583231");
        assert_eq!(identity.email.as_deref(), Some("octocat@github.com"));
        assert_eq!(identity.name.as_deref(), Some("The Octocat"));
        assert_eq!(identity.artifacts.access_token.as_deref(), Some(ACCESS));
        assert_eq!(identity.artifacts.scope.as_deref(), Some("read:user,user:email"));
    }

    #[tokio::test]
    async fn test_missing_email_falls_back_to_primary() {
        let base = fake_github(FakeGithub {
            profile: profile(None),
            emails: Some(json!([
                { "email": "a@x.com", "primary": false, "verified": true },
                { "email": "b@x.com", "primary": true, "verified": true },
            ])),
        })
        .await;

        let identity = verifier(&base).verify(&response(GOOD_CODE)).await.unwrap();
        assert_eq!(identity.email.as_deref(), Some("b@x.com"));
    }

    #[tokio::test]
    async fn test_missing_email_without_primary_takes_first() {
        let base = fake_github(FakeGithub {
            profile: profile(None),
            emails: Some(json!([
                { "email": "a@x.com", "primary": false },
                { "email": "c@x.com", "primary": false },
            ])),
        })
        .await;

        let identity = verifier(&base).verify(&response(GOOD_CODE)).await.unwrap();
        assert_eq!(identity.email.as_deref(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn test_email_list_failure_is_bad_request() {
        let base = fake_github(FakeGithub {
            profile: profile(None),
            emails: None,
        })
        .await;

        let err = verifier(&base).verify(&response(GOOD_CODE)).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_bad_code_is_forbidden() {
        let base = fake_github(FakeGithub {
            profile: profile(Some("octocat@github.com")),
            emails: None,
        })
        .await;

        let err = verifier(&base).verify(&response("stale-code")).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_exchange_error_status_is_forbidden() {
        let router = Router::new().route(
            "/login/oauth/access_token",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(router).await;

        let err = verifier(&base).verify(&response(GOOD_CODE)).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_profile_error_status_is_forbidden() {
        let router = Router::new()
            .route(
                "/login/oauth/access_token",
                post(|| async { Json(json!({ "access_token": ACCESS })) }),
            )
            .route("/user", get(|| async { StatusCode::UNAUTHORIZED }));
        let base = serve(router).await;

        let err = verifier(&base).verify(&response(GOOD_CODE)).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_missing_code_and_bad_callback() {
        let v = verifier("http://127.0.0.1:9");

        let no_code = raw_response(json!({ "type": "success", "url": CALLBACK_URL, "params": {} }));
        assert_eq!(
            v.verify(&no_code).await.unwrap_err().kind(),
            AuthErrorKind::MissingCredential
        );

        let foreign = raw_response(json!({
            "type": "success",
            "url": "https://evil.example.com/callback",
            "params": { "code": GOOD_CODE },
        }));
        assert_eq!(v.verify(&foreign).await.unwrap_err().kind(), AuthErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_forbidden() {
        // nothing listens on the discard port
        let err = verifier("http://127.0.0.1:9")
            .verify(&response(GOOD_CODE))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Forbidden);
    }
}
