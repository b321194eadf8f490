// src/services/reconciler.rs
//! Identity reconciliation: maps a verified provider identity onto a stored
//! user, creating or linking as needed, and mints the session token.
//!
//! Lookup order is fixed:
//! 1. existing account for `(provider, provider_account_id)`
//! 2. existing user with the same email, linked with a new account
//! 3. new user plus account
//!
//! `users.email` and `accounts(provider, provider_account_id)` are unique in the
//! store. When a concurrent sign-in wins either insert, the store reports a
//! conflict and the reconciler re-reads and links instead of creating a
//! duplicate. Each conflict is retried once.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::auth::models::{NormalizedIdentity, User};
use crate::common::{safe_email_log, AuthError};
use crate::services::token::TokenService;
use crate::services::user_store::{OptionalExt, StoreError, UserStore};

/// Which branch of the linking policy produced the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    ExistingIdentity,
    LinkedByEmail,
    NewUser,
}

impl LinkOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkOutcome::ExistingIdentity => "existing_identity",
            LinkOutcome::LinkedByEmail => "linked_by_email",
            LinkOutcome::NewUser => "new_user",
        }
    }
}

#[derive(Debug)]
pub struct SignInResult {
    pub user: User,
    pub token: String,
    pub outcome: LinkOutcome,
}

#[derive(Clone)]
pub struct IdentityReconciler {
    store: Arc<dyn UserStore>,
    tokens: TokenService,
}

impl IdentityReconciler {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    pub async fn reconcile(&self, identity: &NormalizedIdentity) -> Result<SignInResult, AuthError> {
        let (user, outcome) = self.resolve_user(identity).await?;
        let token = self.tokens.mint(&user)?;

        info!(
            user_id = %user.id,
            provider = %identity.provider,
            outcome = outcome.as_str(),
            "Identity reconciled"
        );

        Ok(SignInResult { user, token, outcome })
    }

    async fn resolve_user(
        &self,
        identity: &NormalizedIdentity,
    ) -> Result<(User, LinkOutcome), AuthError> {
        let existing = self
            .store
            .get_account(identity.provider, &identity.provider_account_id)
            .await
            .optional()
            .map_err(|e| lookup_failure(e, "account"))?;

        if let Some(linked) = existing {
            debug!(
                provider = %identity.provider,
                provider_account_id = %identity.provider_account_id,
                account_id = %linked.account.id,
                user_id = %linked.user.id,
                "Found existing account"
            );
            return Ok((linked.user, LinkOutcome::ExistingIdentity));
        }

        let email = match identity.email.as_deref() {
            Some(email) => email,
            None => {
                warn!(
                    provider = %identity.provider,
                    provider_account_id = %identity.provider_account_id,
                    "No account and no email to link or create a user with"
                );
                return Err(AuthError::BadRequest(
                    "Unable to create new user: no email available".to_string(),
                ));
            }
        };

        let by_email = self
            .store
            .get_user_by_email(email)
            .await
            .optional()
            .map_err(|e| lookup_failure(e, "user by email"))?;

        if let Some(user) = by_email {
            debug!(
                user_id = %user.id,
                email = %safe_email_log(email),
                provider = %identity.provider,
                "Linking provider account to existing user by email"
            );
            return self.link(identity, user, LinkOutcome::LinkedByEmail).await;
        }

        let new_user = identity.new_user(Utc::now().to_rfc3339());
        match self.store.create_user(new_user).await {
            Ok(user) => {
                info!(
                    user_id = %user.id,
                    email = %safe_email_log(email),
                    provider = %identity.provider,
                    "Created new user"
                );
                self.link(identity, user, LinkOutcome::NewUser).await
            }
            Err(StoreError::Conflict(_)) => {
                warn!(
                    email = %safe_email_log(email),
                    provider = %identity.provider,
                    "User with this email was created concurrently, linking instead"
                );
                let user = self
                    .store
                    .get_user_by_email(email)
                    .await
                    .map_err(|e| retry_failure(e, "user by email"))?;
                self.link(identity, user, LinkOutcome::LinkedByEmail).await
            }
            Err(e) => {
                error!(
                    error = %e,
                    email = %safe_email_log(email),
                    provider = %identity.provider,
                    "Store rejected new user"
                );
                Err(AuthError::BadRequest("Unable to create new user".to_string()))
            }
        }
    }

    async fn link(
        &self,
        identity: &NormalizedIdentity,
        user: User,
        outcome: LinkOutcome,
    ) -> Result<(User, LinkOutcome), AuthError> {
        match self.store.link_account(identity.new_account(&user.id)).await {
            Ok(account) => {
                debug!(account_id = %account.id, user_id = %user.id, "Account linked");
                Ok((user, outcome))
            }
            Err(StoreError::Conflict(_)) => {
                // a concurrent sign-in linked this identity first; its owner wins
                warn!(
                    provider = %identity.provider,
                    provider_account_id = %identity.provider_account_id,
                    "Account was linked concurrently, using its owner"
                );
                let linked = self
                    .store
                    .get_account(identity.provider, &identity.provider_account_id)
                    .await
                    .map_err(|e| retry_failure(e, "account"))?;
                Ok((linked.user, LinkOutcome::ExistingIdentity))
            }
            Err(e) => {
                error!(
                    error = %e,
                    user_id = %user.id,
                    provider = %identity.provider,
                    "Store rejected account link"
                );
                Err(AuthError::BadRequest("Unable to link account".to_string()))
            }
        }
    }
}

fn lookup_failure(err: StoreError, what: &str) -> AuthError {
    error!(error = %err, lookup = what, "Store lookup failed during reconciliation");
    AuthError::Internal(format!("{} lookup failed", what))
}

fn retry_failure(err: StoreError, what: &str) -> AuthError {
    error!(error = %err, lookup = what, "Re-read after conflict failed");
    AuthError::Conflict(format!("{} changed during sign-in", what))
}
