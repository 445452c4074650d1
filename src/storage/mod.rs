//! Storage backends for Grantry
//!
//! Provides multiple storage backends with a unified trait interface.
//! The authorization provider owns the grant/token lifecycle; clients are
//! registered out of band and are read-only to it.

pub mod memory;
pub mod postgres;
pub mod sql_common;
pub mod sqlite;

use crate::{Result, model::*};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Client registry
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Insert or update a client
    async fn save_client(&self, client: &Client) -> Result<()>;

    /// Get a client by id
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>>;

    /// List all clients, oldest first
    async fn list_clients(&self) -> Result<Vec<Client>>;

    /// List clients registered by a user
    async fn list_clients_by_owner(&self, owner_user_id: &str) -> Result<Vec<Client>>;

    /// Delete a client together with its grants and tokens.
    ///
    /// Returns `NotFound` if the client does not exist.
    async fn delete_client(&self, client_id: &str) -> Result<()>;
}

/// One-time authorization codes
#[async_trait]
pub trait GrantStorage: Send + Sync {
    /// Insert a grant. Returns false if the code is already taken.
    async fn insert_grant(&self, grant: &Grant) -> Result<bool>;

    /// Get the grant issued to `client_id` under `code`, expired or not
    async fn get_grant(&self, client_id: &str, code: &str) -> Result<Option<Grant>>;

    /// Consume a grant and install its token atomically.
    ///
    /// Deletes the grant for `(client_id, code)` if it is still unexpired at
    /// `now`. If nothing was deleted returns false and leaves tokens alone;
    /// otherwise replaces every token of `(token.client_id, token.user_id)`
    /// with `token` in the same transaction.
    async fn redeem_grant(
        &self,
        client_id: &str,
        code: &str,
        now: DateTime<Utc>,
        token: &Token,
    ) -> Result<bool>;
}

/// Access/refresh token pairs
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Look a token up by its access token
    async fn get_token_by_access(&self, access_token: &str) -> Result<Option<Token>>;

    /// Look a token up by refresh token, scoped to the client it was issued to
    async fn get_token_by_refresh(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<Option<Token>>;

    /// Discard all tokens of the pair and insert `token`, atomically
    async fn replace_token(&self, token: &Token) -> Result<()>;

    /// Replace the pair's token with `token` only while it still holds
    /// `refresh_token`.
    ///
    /// Returns false, changing nothing, if that token was revoked or
    /// superseded in the meantime.
    async fn renew_token(&self, refresh_token: &str, token: &Token) -> Result<bool>;

    /// Revoke by refresh token. Returns true if a row was deleted.
    async fn delete_token(&self, client_id: &str, refresh_token: &str) -> Result<bool>;

    /// Drop every token a user granted to one client.
    ///
    /// Returns the number of rows removed.
    async fn delete_client_user_tokens(&self, client_id: &str, user_id: &str) -> Result<u64>;

    /// All tokens a user has granted, newest expiry first
    async fn list_tokens_by_user(&self, user_id: &str) -> Result<Vec<Token>>;

    /// Remove every grant and token belonging to a user.
    ///
    /// Returns the number of rows removed.
    async fn delete_user_data(&self, user_id: &str) -> Result<u64>;

    /// Delete grants expired before `grants_before` and tokens whose access
    /// token expired before `tokens_before`
    async fn purge_expired(
        &self,
        grants_before: DateTime<Utc>,
        tokens_before: DateTime<Utc>,
    ) -> Result<PurgeStats>;
}

/// Complete storage backend
pub trait Storage: ClientStorage + GrantStorage + TokenStorage {}

impl<T> Storage for T where T: ClientStorage + GrantStorage + TokenStorage {}

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;

/// Create a storage backend from configuration
pub async fn create_storage_from_config(
    config: &crate::config::StorageConfig,
) -> crate::Result<Arc<dyn Storage>> {
    match config.driver.as_str() {
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        "sqlite" => Ok(Arc::new(SqliteStorage::new(&config.dsn).await?)),
        "postgres" => Ok(Arc::new(PostgresStorage::new(&config.dsn).await?)),
        _ => Err(crate::GrantryError::config(format!(
            "Unknown storage driver: {}. Supported: memory, sqlite, postgres",
            config.driver
        ))),
    }
}
