//! SQLite storage implementation
//!
//! Provides persistent storage for clients, grants and tokens using SQLite.
//! Timestamps are stored as unix seconds.

use crate::model::*;
use crate::storage::{ClientStorage, GrantStorage, TokenStorage, sql_common::*};
use crate::{GrantryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage
    ///
    /// # Arguments
    /// * `dsn` - Database path (e.g., "~/.grantry/grantry.db" or ":memory:" for in-memory)
    pub async fn new(dsn: &str) -> Result<Self> {
        // Prepend sqlite: prefix if not present and add create-if-missing option
        let connection_string = if dsn.starts_with("sqlite:") {
            if dsn.contains('?') {
                dsn.to_string()
            } else {
                format!("{}?mode=rwc", dsn)
            }
        } else {
            format!("sqlite:{}?mode=rwc", dsn)
        };

        // Extract actual file path for directory creation
        let file_path = dsn.strip_prefix("sqlite:").unwrap_or(dsn);
        let file_path = file_path.split('?').next().unwrap_or(file_path);

        // Validate path to prevent directory traversal attacks
        if file_path.contains("..") {
            return Err(GrantryError::config(
                "Database path cannot contain '..' (path traversal not allowed)",
            ));
        }

        let in_memory = file_path == ":memory:" || file_path.is_empty();

        // Create parent directory if needed (unless it's :memory:)
        if !in_memory
            && let Some(parent) = Path::new(file_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Pragmas are set per connection, so they live on the connect options
        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| GrantryError::config(format!("Invalid SQLite DSN: {}", e)))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        // Every connection to :memory: is its own database
        let max_connections = if in_memory { 1 } else { 8 };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| GrantryError::storage(format!("Failed to connect to SQLite: {}", e)))?;

        // Run SQLite-specific migrations
        sqlx::migrate!("./migrations/sqlite").run(&pool).await?;

        tracing::debug!(dsn = %file_path, "SQLite storage ready");

        Ok(Self { pool })
    }

    fn parse_client(row: &SqliteRow) -> Result<Client> {
        Ok(Client {
            client_id: row.try_get("client_id")?,
            client_secret: row.try_get("client_secret")?,
            redirect_uri: row.try_get("redirect_uri")?,
            owner_user_id: row.try_get("owner_user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            website: row.try_get("website")?,
            created_at: datetime_from_unix(row.try_get("created_at")?),
        })
    }

    fn parse_grant(row: &SqliteRow) -> Result<Grant> {
        Ok(Grant {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            code: row.try_get("code")?,
            user_id: row.try_get("user_id")?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            expires: datetime_from_unix(row.try_get("expires")?),
        })
    }

    fn parse_token(row: &SqliteRow) -> Result<Token> {
        Ok(Token {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            user_id: row.try_get("user_id")?,
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            scope: row.try_get("scope")?,
            expires: datetime_from_unix(row.try_get("expires")?),
        })
    }

    /// Discard the pair's tokens and insert the new one on an open transaction
    async fn write_token(conn: &mut SqliteConnection, token: &Token) -> Result<()> {
        sqlx::query("DELETE FROM oauth_tokens WHERE client_id = ? AND user_id = ?")
            .bind(&token.client_id)
            .bind(&token.user_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            "INSERT INTO oauth_tokens (id, client_id, user_id, access_token, refresh_token, scope, expires)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(client_id, user_id) DO UPDATE SET
                id = excluded.id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                scope = excluded.scope,
                expires = excluded.expires",
        )
        .bind(&token.id)
        .bind(&token.client_id)
        .bind(&token.user_id)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(&token.scope)
        .bind(datetime_to_unix(token.expires))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ClientStorage for SqliteStorage {
    async fn save_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            "INSERT INTO oauth_clients (client_id, client_secret, redirect_uri, owner_user_id, name, description, website, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(client_id) DO UPDATE SET
                client_secret = excluded.client_secret,
                redirect_uri = excluded.redirect_uri,
                owner_user_id = excluded.owner_user_id,
                name = excluded.name,
                description = excluded.description,
                website = excluded.website",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(&client.redirect_uri)
        .bind(&client.owner_user_id)
        .bind(&client.name)
        .bind(&client.description)
        .bind(&client.website)
        .bind(datetime_to_unix(client.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM oauth_clients WHERE client_id = ?",
            CLIENT_COLUMNS
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_client).transpose()
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM oauth_clients ORDER BY created_at ASC, client_id ASC",
            CLIENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_client).collect()
    }

    async fn list_clients_by_owner(&self, owner_user_id: &str) -> Result<Vec<Client>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM oauth_clients WHERE owner_user_id = ?
             ORDER BY created_at ASC, client_id ASC",
            CLIENT_COLUMNS
        ))
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_client).collect()
    }

    async fn delete_client(&self, client_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM oauth_tokens WHERE client_id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM oauth_grants WHERE client_id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM oauth_clients WHERE client_id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(GrantryError::not_found("Client", client_id));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl GrantStorage for SqliteStorage {
    async fn insert_grant(&self, grant: &Grant) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO oauth_grants (id, client_id, code, user_id, redirect_uri, scope, expires)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(code) DO NOTHING",
        )
        .bind(&grant.id)
        .bind(&grant.client_id)
        .bind(&grant.code)
        .bind(&grant.user_id)
        .bind(&grant.redirect_uri)
        .bind(&grant.scope)
        .bind(datetime_to_unix(grant.expires))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_grant(&self, client_id: &str, code: &str) -> Result<Option<Grant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM oauth_grants WHERE client_id = ? AND code = ?",
            GRANT_COLUMNS
        ))
        .bind(client_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_grant).transpose()
    }

    async fn redeem_grant(
        &self,
        client_id: &str,
        code: &str,
        now: DateTime<Utc>,
        token: &Token,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // The first statement is a write, so the transaction takes the
        // database write lock immediately and concurrent redeemers serialize
        let deleted =
            sqlx::query("DELETE FROM oauth_grants WHERE client_id = ? AND code = ? AND expires > ?")
                .bind(client_id)
                .bind(code)
                .bind(datetime_to_unix(now))
                .execute(&mut *tx)
                .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::write_token(&mut tx, token).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl TokenStorage for SqliteStorage {
    async fn get_token_by_access(&self, access_token: &str) -> Result<Option<Token>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM oauth_tokens WHERE access_token = ?",
            TOKEN_COLUMNS
        ))
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_token).transpose()
    }

    async fn get_token_by_refresh(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<Option<Token>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM oauth_tokens WHERE client_id = ? AND refresh_token = ?",
            TOKEN_COLUMNS
        ))
        .bind(client_id)
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_token).transpose()
    }

    async fn replace_token(&self, token: &Token) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_token(&mut tx, token).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn renew_token(&self, refresh_token: &str, token: &Token) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM oauth_tokens WHERE client_id = ? AND user_id = ? AND refresh_token = ?",
        )
        .bind(&token.client_id)
        .bind(&token.user_id)
        .bind(refresh_token)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::write_token(&mut tx, token).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_token(&self, client_id: &str, refresh_token: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM oauth_tokens WHERE client_id = ? AND refresh_token = ?")
                .bind(client_id)
                .bind(refresh_token)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_client_user_tokens(&self, client_id: &str, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE client_id = ? AND user_id = ?")
            .bind(client_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_tokens_by_user(&self, user_id: &str) -> Result<Vec<Token>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM oauth_tokens WHERE user_id = ? ORDER BY expires DESC",
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_token).collect()
    }

    async fn delete_user_data(&self, user_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let grants = sqlx::query("DELETE FROM oauth_grants WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let tokens = sqlx::query("DELETE FROM oauth_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(grants.rows_affected() + tokens.rows_affected())
    }

    async fn purge_expired(
        &self,
        grants_before: DateTime<Utc>,
        tokens_before: DateTime<Utc>,
    ) -> Result<PurgeStats> {
        let mut tx = self.pool.begin().await?;

        let grants = sqlx::query("DELETE FROM oauth_grants WHERE expires < ?")
            .bind(datetime_to_unix(grants_before))
            .execute(&mut *tx)
            .await?;
        let tokens = sqlx::query("DELETE FROM oauth_tokens WHERE expires < ?")
            .bind(datetime_to_unix(tokens_before))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(PurgeStats {
            grants: grants.rows_affected(),
            tokens: tokens.rows_affected(),
        })
    }
}
