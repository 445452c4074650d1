//! PostgreSQL storage backend
//!
//! Provides a production-ready PostgreSQL implementation of the storage traits.

use super::{ClientStorage, GrantStorage, TokenStorage, sql_common::*};
use crate::{GrantryError, Result, model::*};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};

/// PostgreSQL storage implementation
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Create a new PostgreSQL storage from a connection string
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            GrantryError::storage(format!("Failed to connect to PostgreSQL: {}", e))
        })?;

        // Run PostgreSQL-specific migrations
        sqlx::migrate!("./migrations/postgres").run(&pool).await?;

        Ok(Self { pool })
    }

    fn parse_client(row: &PgRow) -> Result<Client> {
        Ok(Client {
            client_id: row.try_get("client_id")?,
            client_secret: row.try_get("client_secret")?,
            redirect_uri: row.try_get("redirect_uri")?,
            owner_user_id: row.try_get("owner_user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            website: row.try_get("website")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn parse_grant(row: &PgRow) -> Result<Grant> {
        Ok(Grant {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            code: row.try_get("code")?,
            user_id: row.try_get("user_id")?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            expires: row.try_get("expires")?,
        })
    }

    fn parse_token(row: &PgRow) -> Result<Token> {
        Ok(Token {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            user_id: row.try_get("user_id")?,
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            scope: row.try_get("scope")?,
            expires: row.try_get("expires")?,
        })
    }

    /// Discard the pair's tokens and insert the new one on an open transaction.
    ///
    /// Two transactions racing on the same pair both see nothing to delete;
    /// the unique index makes the loser wait and the upsert then overwrites.
    async fn write_token(conn: &mut PgConnection, token: &Token) -> Result<()> {
        sqlx::query("DELETE FROM oauth_tokens WHERE client_id = $1 AND user_id = $2")
            .bind(&token.client_id)
            .bind(&token.user_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            "INSERT INTO oauth_tokens (id, client_id, user_id, access_token, refresh_token, scope, expires)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT(client_id, user_id) DO UPDATE SET
                id = EXCLUDED.id,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                scope = EXCLUDED.scope,
                expires = EXCLUDED.expires",
        )
        .bind(&token.id)
        .bind(&token.client_id)
        .bind(&token.user_id)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(&token.scope)
        .bind(token.expires)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ClientStorage for PostgresStorage {
    async fn save_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            "INSERT INTO oauth_clients (client_id, client_secret, redirect_uri, owner_user_id, name, description, website, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT(client_id) DO UPDATE SET
                client_secret = EXCLUDED.client_secret,
                redirect_uri = EXCLUDED.redirect_uri,
                owner_user_id = EXCLUDED.owner_user_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                website = EXCLUDED.website",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(&client.redirect_uri)
        .bind(&client.owner_user_id)
        .bind(&client.name)
        .bind(&client.description)
        .bind(&client.website)
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM oauth_clients WHERE client_id = $1",
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
            "SELECT {} FROM oauth_clients WHERE owner_user_id = $1
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

        sqlx::query("DELETE FROM oauth_tokens WHERE client_id = $1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM oauth_grants WHERE client_id = $1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM oauth_clients WHERE client_id = $1")
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
impl GrantStorage for PostgresStorage {
    async fn insert_grant(&self, grant: &Grant) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO oauth_grants (id, client_id, code, user_id, redirect_uri, scope, expires)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT(code) DO NOTHING",
        )
        .bind(&grant.id)
        .bind(&grant.client_id)
        .bind(&grant.code)
        .bind(&grant.user_id)
        .bind(&grant.redirect_uri)
        .bind(&grant.scope)
        .bind(grant.expires)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_grant(&self, client_id: &str, code: &str) -> Result<Option<Grant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM oauth_grants WHERE client_id = $1 AND code = $2",
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

        // A concurrent DELETE of the same row blocks until we commit and then
        // matches nothing
        let deleted = sqlx::query(
            "DELETE FROM oauth_grants WHERE client_id = $1 AND code = $2 AND expires > $3",
        )
        .bind(client_id)
        .bind(code)
        .bind(now)
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
impl TokenStorage for PostgresStorage {
    async fn get_token_by_access(&self, access_token: &str) -> Result<Option<Token>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM oauth_tokens WHERE access_token = $1",
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
            "SELECT {} FROM oauth_tokens WHERE client_id = $1 AND refresh_token = $2",
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
            "DELETE FROM oauth_tokens WHERE client_id = $1 AND user_id = $2 AND refresh_token = $3",
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
            sqlx::query("DELETE FROM oauth_tokens WHERE client_id = $1 AND refresh_token = $2")
                .bind(client_id)
                .bind(refresh_token)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_client_user_tokens(&self, client_id: &str, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE client_id = $1 AND user_id = $2")
            .bind(client_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_tokens_by_user(&self, user_id: &str) -> Result<Vec<Token>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM oauth_tokens WHERE user_id = $1 ORDER BY expires DESC",
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_token).collect()
    }

    async fn delete_user_data(&self, user_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let grants = sqlx::query("DELETE FROM oauth_grants WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let tokens = sqlx::query("DELETE FROM oauth_tokens WHERE user_id = $1")
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

        let grants = sqlx::query("DELETE FROM oauth_grants WHERE expires < $1")
            .bind(grants_before)
            .execute(&mut *tx)
            .await?;
        let tokens = sqlx::query("DELETE FROM oauth_tokens WHERE expires < $1")
            .bind(tokens_before)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(PurgeStats {
            grants: grants.rows_affected(),
            tokens: tokens.rows_affected(),
        })
    }
}
