// src/services/user_store.rs
//! User store gateway
//!
//! The reconciler and token service only see the [`UserStore`] trait. Lookup
//! misses come back as [`StoreError::NotFound`] and unique-constraint
//! violations as [`StoreError::Conflict`], so callers branch on a typed outcome.

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::models::{Account, LinkedAccount, NewAccount, NewUser, Provider, User};
use crate::common::{generate_account_id, generate_user_id, safe_optional_email_log};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Turns a `NotFound` miss into `Ok(None)`, keeping every other failure.
pub trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for StoreResult<T> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user_by_id(&self, id: &str) -> StoreResult<User>;

    async fn get_user_by_email(&self, email: &str) -> StoreResult<User>;

    async fn get_account(
        &self,
        provider: Provider,
        provider_account_id: &str,
    ) -> StoreResult<LinkedAccount>;

    async fn link_account(&self, account: NewAccount) -> StoreResult<Account>;
}

/// SQLite-backed user store
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    db: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let id = generate_user_id();

        sqlx::query(
            "INSERT INTO users (id, name, email, picture_url, email_verified_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user.name.as_deref())
        .bind(user.email.as_deref())
        .bind(user.picture_url.as_deref())
        .bind(user.email_verified_at.as_deref())
        .execute(&self.db)
        .await
        .map_err(|e| {
            let err = StoreError::from(e);
            if !matches!(err, StoreError::Conflict(_)) {
                error!(
                    error = %err,
                    email = %safe_optional_email_log(user.email.as_deref()),
                    "Database error inserting user"
                );
            }
            err
        })?;

        debug!(user_id = %id, "Inserted user, fetching record");
        self.get_user_by_id(&id).await
    }

    async fn get_user_by_id(&self, id: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn get_account(
        &self,
        provider: Provider,
        provider_account_id: &str,
    ) -> StoreResult<LinkedAccount> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE provider = ? AND provider_account_id = ?",
        )
        .bind(provider.as_str())
        .bind(provider_account_id)
        .fetch_one(&self.db)
        .await?;

        let user = self.get_user_by_id(&account.user_id).await?;
        Ok(LinkedAccount { account, user })
    }

    async fn link_account(&self, account: NewAccount) -> StoreResult<Account> {
        let id = generate_account_id();

        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, user_id, provider, provider_account_id, access_token, id_token, token_type, scope)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&account.user_id)
        .bind(account.provider.as_str())
        .bind(&account.provider_account_id)
        .bind(account.access_token.as_deref())
        .bind(account.id_token.as_deref())
        .bind(account.token_type.as_deref())
        .bind(account.scope.as_deref())
        .execute(&self.db)
        .await?;

        debug!(
            account_id = %id,
            user_id = %account.user_id,
            provider = %account.provider,
            "Linked provider account"
        );

        let row = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
impl SqliteUserStore {
    pub(crate) async fn count_users(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await
            .unwrap();
        count
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> SqliteUserStore {
    use sqlx::sqlite::SqlitePoolOptions;

    // a single connection keeps every query on the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::common::migrations::create_schema(&pool).await.unwrap();
    SqliteUserStore::new(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: Some("Ada Lovelace".to_string()),
            email: Some(email.to_string()),
            picture_url: Some("https://example.com/ada.png".to_string()),
            email_verified_at: Some("2024-01-01T00:00:00+00:00".to_string()),
        }
    }

    fn new_account(user_id: &str, provider: Provider, provider_account_id: &str) -> NewAccount {
        NewAccount {
            user_id: user_id.to_string(),
            provider,
            provider_account_id: provider_account_id.to_string(),
            access_token: Some("provider-access".to_string()),
            id_token: None,
            token_type: Some("bearer".to_string()),
            scope: Some("read:user,user:email".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_user() {
        let store = memory_store().await;
        let user = store.create_user(new_user("ada@example.com")).await.unwrap();

        assert!(user.id.starts_with("U_"));
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert!(user.created_at.is_some());

        assert_eq!(store.get_user_by_id(&user.id).await.unwrap(), user);
        assert_eq!(store.get_user_by_email("ada@example.com").await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_misses_are_not_found() {
        let store = memory_store().await;

        assert!(matches!(
            store.get_user_by_id("U_MISSING").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_user_by_email("nobody@example.com").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_account(Provider::Github, "42").await,
            Err(StoreError::NotFound)
        ));
        assert!(store
            .get_user_by_email("nobody@example.com")
            .await
            .optional()
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let store = memory_store().await;
        store.create_user(new_user("ada@example.com")).await.unwrap();

        let result = store.create_user(new_user("ada@example.com")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_link_account_and_resolve_owner() {
        let store = memory_store().await;
        let user = store.create_user(new_user("ada@example.com")).await.unwrap();

        let account = store
            .link_account(new_account(&user.id, Provider::Github, "42"))
            .await
            .unwrap();
        assert!(account.id.starts_with("AC_"));
        assert_eq!(account.provider, "github");
        assert_eq!(account.access_token.as_deref(), Some("provider-access"));

        let linked = store.get_account(Provider::Github, "42").await.unwrap();
        assert_eq!(linked.account.id, account.id);
        assert_eq!(linked.user, user);

        // same provider account id on another provider is a different identity
        assert!(matches!(
            store.get_account(Provider::Google, "42").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_link_is_conflict() {
        let store = memory_store().await;
        let first = store.create_user(new_user("ada@example.com")).await.unwrap();
        let second = store.create_user(new_user("grace@example.com")).await.unwrap();

        store
            .link_account(new_account(&first.id, Provider::Apple, "001.abc"))
            .await
            .unwrap();
        let result = store
            .link_account(new_account(&second.id, Provider::Apple, "001.abc"))
            .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        let linked = store.get_account(Provider::Apple, "001.abc").await.unwrap();
        assert_eq!(linked.user.id, first.id);
    }
}
