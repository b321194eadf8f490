//! Authentication data models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Identity providers this service accepts sign-ins from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenID-style provider, verified by token introspection
    Google,
    /// OAuth code exchange plus profile fetch
    Github,
    /// Device-native sign-in, verified locally
    Apple,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Github, Provider::Apple];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
            Provider::Apple => "apple",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown provider: {}", s))
    }
}

/// JWT claims carried by a session token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// User database model
#[derive(FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture_url: Option<String>,
    pub email_verified_at: Option<String>,
    pub created_at: Option<String>,
}

/// Fields for a user created on first sign-in
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture_url: Option<String>,
    pub email_verified_at: Option<String>,
}

/// Link record: "this provider identity authenticates this user"
#[derive(FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: String,
    pub provider: Provider,
    pub provider_account_id: String,
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// An account resolved together with the user that owns it
#[derive(Debug, Clone)]
pub struct LinkedAccount {
    pub account: Account,
    pub user: User,
}

/// Provider credentials kept on the account row after verification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityArtifacts {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// Provider-agnostic "who signed in", produced by a verifier
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedIdentity {
    pub provider: Provider,
    pub provider_account_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture_url: Option<String>,
    pub artifacts: IdentityArtifacts,
}

impl NormalizedIdentity {
    pub fn new_user(&self, email_verified_at: String) -> NewUser {
        NewUser {
            name: self.name.clone(),
            email: self.email.clone(),
            picture_url: self.picture_url.clone(),
            email_verified_at: Some(email_verified_at),
        }
    }

    pub fn new_account(&self, user_id: &str) -> NewAccount {
        NewAccount {
            user_id: user_id.to_string(),
            provider: self.provider,
            provider_account_id: self.provider_account_id.clone(),
            access_token: self.artifacts.access_token.clone(),
            id_token: self.artifacts.id_token.clone(),
            token_type: self.artifacts.token_type.clone(),
            scope: self.artifacts.scope.clone(),
        }
    }
}

/// Outcome reported by the client-side provider flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOutcome {
    Success,
    Cancel,
    Error,
    Locked,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderErrorInfo {
    pub code: String,
    pub description: Option<String>,
    pub message: Option<String>,
}

/// Token set returned by an OpenID-style client flow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationTokens {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// Raw payload a client sends after finishing the provider interaction.
/// Validated by a verifier and discarded; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProviderResponse {
    #[serde(rename = "type")]
    pub outcome: ResponseOutcome,
    pub error_code: Option<String>,
    pub error: Option<ProviderErrorInfo>,
    pub params: Option<HashMap<String, Value>>,
    pub authentication: Option<AuthenticationTokens>,
    #[serde(default)]
    pub url: String,
}

impl RawProviderResponse {
    /// Non-empty string parameter from `params`
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .as_ref()?
            .get(key)?
            .as_str()
            .filter(|v| !v.is_empty())
    }

    /// Nested object parameter from `params`
    pub fn param_value(&self, key: &str) -> Option<&Value> {
        self.params.as_ref()?.get(key).filter(|v| !v.is_null())
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code
            .as_deref()
            .or_else(|| self.error.as_ref().map(|e| e.code.as_str()))
    }
}

/// POST /api/auth/sign-in body
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub provider: Provider,
    pub response: RawProviderResponse,
}

/// Result of a successful sign-in or refresh
#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct RawTokenResponse {
    pub token: Option<String>,
}
