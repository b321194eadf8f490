// src/common/config.rs
//! Process-wide configuration for the identity service.
//!
//! Built once in `main` and handed to the token service, the provider
//! verifiers and the session middleware. Nothing below `main` reads the
//! environment.

use std::collections::HashSet;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "session-token";

pub const DEFAULT_GOOGLE_ISSUERS: &str = "https://accounts.google.com,accounts.google.com";
pub const DEFAULT_GOOGLE_TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/tokeninfo";
pub const DEFAULT_GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_APPLE_ISSUER: &str = "https://appleid.apple.com";

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub allowed_issuers: HashSet<String>,
    pub tokeninfo_url: String,
}

#[derive(Clone)]
pub struct GithubConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct AppleConfig {
    pub client_id: Option<String>,
    pub issuer: String,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_seconds: i64,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,
    pub callback_url_prefixes: Vec<String>,
    pub provider_timeout: Duration,
    pub google: GoogleConfig,
    pub github: GithubConfig,
    pub apple: AppleConfig,
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let session_ttl_seconds = match get("SESSION_TTL_SECONDS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(ttl) if ttl > 0 => ttl,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "SESSION_TTL_SECONDS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_SESSION_TTL_SECONDS,
        };

        let provider_timeout_secs = match get("PROVIDER_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PROVIDER_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_PROVIDER_TIMEOUT_SECS,
        };

        let session_cookie_secure = match get("SESSION_COOKIE_SECURE") {
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "SESSION_COOKIE_SECURE",
                        value: raw,
                    })
                }
            },
            None => true,
        };

        let google_issuers =
            get("GOOGLE_ISSUERS").unwrap_or_else(|| DEFAULT_GOOGLE_ISSUERS.to_string());

        Ok(Self {
            jwt_secret,
            session_ttl_seconds,
            session_cookie_name: get("SESSION_COOKIE_NAME")
                .unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string()),
            session_cookie_secure,
            callback_url_prefixes: split_list(get("CALLBACK_URL_PREFIXES").as_deref().unwrap_or("")),
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            google: GoogleConfig {
                client_id: get("GOOGLE_CLIENT_ID"),
                allowed_issuers: split_list(&google_issuers).into_iter().collect(),
                tokeninfo_url: get("GOOGLE_TOKENINFO_URL")
                    .unwrap_or_else(|| DEFAULT_GOOGLE_TOKENINFO_URL.to_string()),
            },
            github: GithubConfig {
                client_id: get("GITHUB_ID"),
                client_secret: get("GITHUB_SECRET"),
                token_url: get("GITHUB_TOKEN_URL")
                    .unwrap_or_else(|| DEFAULT_GITHUB_TOKEN_URL.to_string()),
                api_url: get("GITHUB_API_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            },
            apple: AppleConfig {
                client_id: get("APPLE_CLIENT_ID"),
                issuer: get("APPLE_ISSUER").unwrap_or_else(|| DEFAULT_APPLE_ISSUER.to_string()),
            },
        })
    }

    /// True when `url` starts with one of the registered callback prefixes.
    pub fn is_registered_callback(&self, url: &str) -> bool {
        self.callback_url_prefixes
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    }
}

const REDACTED: &str = "[REDACTED]";

impl fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| REDACTED))
            .field("token_url", &self.token_url)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &REDACTED)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("session_cookie_name", &self.session_cookie_name)
            .field("session_cookie_secure", &self.session_cookie_secure)
            .field("callback_url_prefixes", &self.callback_url_prefixes)
            .field("provider_timeout", &self.provider_timeout)
            .field("google", &self.google)
            .field("github", &self.github)
            .field("apple", &self.apple)
            .finish()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
