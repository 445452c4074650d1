//! Authorization provider
//!
//! Validates authorization and token requests, issues grants and tokens, and
//! resolves bearer tokens back to the user that granted them. Stateless
//! between requests: everything is read from and written to storage.

use super::random::generate_string;
use super::request::{AuthorizationRequest, TokenGrant, TokenRequest};
use super::scope::{self, Scope};
use crate::constants::*;
use crate::error::OAuthError;
use crate::model::{Client, Grant, Token};
use crate::storage::Storage;
use crate::{GrantryError, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Immutable provider settings, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Length of generated codes and tokens
    pub token_length: usize,
    /// Authorization code lifetime
    pub grant_expire: Duration,
    /// Access token lifetime
    pub token_expire: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token_length: DEFAULT_TOKEN_LENGTH,
            grant_expire: Duration::seconds(DEFAULT_GRANT_EXPIRE_SECS),
            token_expire: Duration::seconds(DEFAULT_TOKEN_EXPIRE_SECS),
        }
    }
}

/// Body of a successful token response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub scope: String,
}

/// The user and scopes behind a valid bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizedUser {
    pub user_id: String,
    pub client_id: String,
    pub scopes: Vec<Scope>,
}

impl AuthorizedUser {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// What a validated token request will be exchanged against
#[derive(Debug, Clone)]
pub enum GrantSource {
    AuthorizationCode(Grant),
    RefreshToken(Token),
}

/// Outcome of [`AuthorizationProvider::validate_token_request`]
#[derive(Debug, Clone)]
pub struct ValidatedTokenRequest {
    pub client: Client,
    pub source: GrantSource,
}

impl ValidatedTokenRequest {
    pub fn user_id(&self) -> &str {
        match &self.source {
            GrantSource::AuthorizationCode(grant) => &grant.user_id,
            GrantSource::RefreshToken(token) => &token.user_id,
        }
    }

    /// Scope the grant or prior token carries
    pub fn scope(&self) -> &str {
        match &self.source {
            GrantSource::AuthorizationCode(grant) => &grant.scope,
            GrantSource::RefreshToken(token) => &token.scope,
        }
    }

    pub fn grant_type(&self) -> &'static str {
        match &self.source {
            GrantSource::AuthorizationCode(_) => GRANT_TYPE_AUTHORIZATION_CODE,
            GrantSource::RefreshToken(_) => GRANT_TYPE_REFRESH_TOKEN,
        }
    }
}

/// Fields of a new client registration
#[derive(Debug, Clone, Default)]
pub struct ClientRegistration {
    pub name: String,
    pub redirect_uri: String,
    pub owner_user_id: String,
    pub description: Option<String>,
    pub website: Option<String>,
}

/// Orchestrates the grant -> token -> refresh lifecycle
#[derive(Clone)]
pub struct AuthorizationProvider {
    storage: Arc<dyn Storage>,
    config: ProviderConfig,
}

impl AuthorizationProvider {
    pub fn new(storage: Arc<dyn Storage>, config: ProviderConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Validate an authorization request before the consent prompt.
    ///
    /// Checks client, response type, redirect URI and scope in that order
    /// and returns the client so the prompt can show its metadata.
    pub async fn validate_authorization_request(
        &self,
        req: &AuthorizationRequest,
    ) -> Result<Client> {
        let client = match req.client_id.as_deref() {
            Some(client_id) => self.storage.get_client(client_id).await?,
            None => None,
        };
        let client = client.ok_or_else(|| reject(OAuthError::InvalidClient))?;

        if req.response_type.as_deref() != Some(RESPONSE_TYPE_CODE) {
            return Err(reject(OAuthError::UnsupportedResponseType));
        }

        let redirect_uri = req.redirect_uri.as_deref().unwrap_or_default();
        if !redirect_matches(&client, redirect_uri) {
            return Err(reject(OAuthError::InvalidRedirectUri));
        }

        if let Some(requested) = req.scope.as_deref().filter(|s| !s.is_empty())
            && !scope::validate_scope(requested, None)
        {
            return Err(reject(OAuthError::InvalidScope));
        }

        Ok(client)
    }

    /// Mint a one-time authorization code after the resource owner approved.
    ///
    /// Regenerates the code on a collision, up to a few attempts.
    pub async fn generate_grant(
        &self,
        client_id: &str,
        user_id: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<String> {
        for _ in 0..GRANT_CODE_ATTEMPTS {
            let grant = Grant {
                id: Uuid::new_v4().to_string(),
                client_id: client_id.to_string(),
                code: generate_string(self.config.token_length),
                user_id: user_id.to_string(),
                redirect_uri: redirect_uri.to_string(),
                scope: scope.to_string(),
                expires: Utc::now() + self.config.grant_expire,
            };

            if self.storage.insert_grant(&grant).await? {
                tracing::info!(client_id = %client_id, user_id = %user_id, "Authorization grant issued");
                crate::telemetry::record_grant_issued();
                return Ok(grant.code);
            }

            tracing::warn!(client_id = %client_id, "Authorization code collision, regenerating");
        }

        Err(GrantryError::storage(
            "Could not allocate a unique authorization code",
        ))
    }

    /// Read-only validation of a token request.
    ///
    /// The client is authenticated before the grant type is looked at, so a
    /// bad secret always reports `invalid_client`.
    pub async fn validate_token_request(
        &self,
        req: &TokenRequest,
    ) -> Result<ValidatedTokenRequest> {
        let client = self
            .authenticate_client(req.client_id.as_deref(), req.client_secret.as_deref())
            .await?;

        let source = match req.grant().map_err(reject)? {
            TokenGrant::AuthorizationCode { code, redirect_uri } => {
                let now = Utc::now();
                let grant = self
                    .storage
                    .get_grant(&client.client_id, &code)
                    .await?
                    .filter(|g| g.is_valid_at(now))
                    .ok_or_else(|| reject(OAuthError::InvalidGrant))?;

                if grant.redirect_uri != redirect_uri {
                    return Err(reject(OAuthError::InvalidRedirectUri));
                }
                GrantSource::AuthorizationCode(grant)
            }
            TokenGrant::RefreshToken { refresh_token } => {
                let token = self
                    .storage
                    .get_token_by_refresh(&client.client_id, &refresh_token)
                    .await?
                    .ok_or_else(|| reject(OAuthError::InvalidGrant))?;
                GrantSource::RefreshToken(token)
            }
        };

        Ok(ValidatedTokenRequest { client, source })
    }

    /// Issue a token for the pair, discarding any previous one.
    ///
    /// A fresh refresh token is generated when `refresh_token` is `None` or
    /// empty; otherwise the given one is kept. The access token always rotates.
    pub async fn issue_token(
        &self,
        client_id: &str,
        refresh_token: Option<&str>,
        user_id: &str,
        scope: &str,
    ) -> Result<IssuedToken> {
        let token = self.build_token(client_id, refresh_token, user_id, scope);
        self.storage.replace_token(&token).await?;

        let grant_type = if refresh_token.is_some_and(|r| !r.is_empty()) {
            GRANT_TYPE_REFRESH_TOKEN
        } else {
            GRANT_TYPE_AUTHORIZATION_CODE
        };
        Ok(self.issued(token, grant_type))
    }

    /// Run the full token endpoint exchange: validate, consume, issue.
    pub async fn exchange_token(&self, req: &TokenRequest) -> Result<IssuedToken> {
        let validated = self.validate_token_request(req).await?;
        let scope = narrow_scope(validated.scope(), req.scope.as_deref())?;
        let grant_type = validated.grant_type();
        let client_id = validated.client.client_id;

        match validated.source {
            GrantSource::AuthorizationCode(grant) => {
                let token = self.build_token(&client_id, None, &grant.user_id, &scope);
                // Lost a race with another redemption, or expired since validation
                if !self
                    .storage
                    .redeem_grant(&client_id, &grant.code, Utc::now(), &token)
                    .await?
                {
                    return Err(reject(OAuthError::InvalidGrant));
                }
                Ok(self.issued(token, grant_type))
            }
            GrantSource::RefreshToken(previous) => {
                let token = self.build_token(
                    &client_id,
                    Some(&previous.refresh_token),
                    &previous.user_id,
                    &scope,
                );
                // Revoked or superseded since validation
                if !self
                    .storage
                    .renew_token(&previous.refresh_token, &token)
                    .await?
                {
                    return Err(reject(OAuthError::InvalidGrant));
                }
                Ok(self.issued(token, grant_type))
            }
        }
    }

    /// Resolve an `Authorization` header to the user behind the token.
    ///
    /// Every scope in `required` must have been granted.
    pub async fn get_authorized_user(
        &self,
        authorization: Option<&str>,
        required: &[Scope],
    ) -> Result<AuthorizedUser> {
        let access_token =
            parse_bearer(authorization).ok_or_else(|| reject(OAuthError::NotAuthorized))?;

        let now = Utc::now();
        let token = self
            .storage
            .get_token_by_access(access_token)
            .await?
            .filter(|t| t.is_valid_at(now))
            .ok_or_else(|| reject(OAuthError::InvalidToken))?;

        if !scope::scope_contains(&token.scope, required) {
            return Err(reject(OAuthError::InvalidToken));
        }

        Ok(AuthorizedUser {
            scopes: scope::stored_scopes(&token.scope),
            user_id: token.user_id,
            client_id: token.client_id,
        })
    }

    /// Client-authenticated revocation by refresh token.
    ///
    /// Unknown tokens are not an error.
    pub async fn revoke_token(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        refresh_token: &str,
    ) -> Result<()> {
        let client = self.authenticate_client(client_id, client_secret).await?;
        let removed = self
            .storage
            .delete_token(&client.client_id, refresh_token)
            .await?;
        tracing::info!(client_id = %client.client_id, removed, "Token revocation");
        Ok(())
    }

    /// Resource-owner revocation: drop every token `user_id` granted to
    /// `client_id`. Returns how many were removed.
    pub async fn revoke_authorization(&self, user_id: &str, client_id: &str) -> Result<u64> {
        let removed = self
            .storage
            .delete_client_user_tokens(client_id, user_id)
            .await?;
        tracing::info!(client_id = %client_id, user_id = %user_id, removed, "Authorization withdrawn");
        Ok(removed)
    }

    /// Live authorizations a user has granted
    pub async fn authorized_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        self.storage.list_tokens_by_user(user_id).await
    }

    /// Register a new client with generated credentials
    pub async fn register_client(&self, registration: ClientRegistration) -> Result<Client> {
        if registration.name.trim().is_empty() {
            return Err(GrantryError::validation("client name is required"));
        }
        if registration.owner_user_id.trim().is_empty() {
            return Err(GrantryError::validation("client owner is required"));
        }
        if !is_valid_redirect_uri(&registration.redirect_uri) {
            return Err(GrantryError::validation(format!(
                "invalid redirect uri: {}",
                registration.redirect_uri
            )));
        }

        let client = Client {
            client_id: generate_string(CLIENT_ID_LENGTH),
            client_secret: generate_string(CLIENT_SECRET_LENGTH),
            redirect_uri: registration.redirect_uri,
            owner_user_id: registration.owner_user_id,
            name: registration.name,
            description: registration.description,
            website: registration.website,
            created_at: Utc::now(),
        };
        self.storage.save_client(&client).await?;

        tracing::info!(client_id = %client.client_id, owner = %client.owner_user_id, "Client registered");
        Ok(client)
    }

    async fn authenticate_client(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<Client> {
        let client = match client_id {
            Some(client_id) => self.storage.get_client(client_id).await?,
            None => None,
        };
        let client = client.ok_or_else(|| reject(OAuthError::InvalidClient))?;

        let secret = client_secret.unwrap_or_default();
        if client
            .client_secret
            .as_bytes()
            .ct_eq(secret.as_bytes())
            .unwrap_u8()
            == 0
        {
            return Err(reject(OAuthError::InvalidClient));
        }

        Ok(client)
    }

    fn build_token(
        &self,
        client_id: &str,
        refresh_token: Option<&str>,
        user_id: &str,
        scope: &str,
    ) -> Token {
        Token {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            access_token: generate_string(self.config.token_length),
            refresh_token: refresh_token
                .filter(|r| !r.is_empty())
                .map(String::from)
                .unwrap_or_else(|| generate_string(self.config.token_length)),
            scope: scope.to_string(),
            expires: Utc::now() + self.config.token_expire,
        }
    }

    fn issued(&self, token: Token, grant_type: &str) -> IssuedToken {
        tracing::info!(
            client_id = %token.client_id,
            user_id = %token.user_id,
            grant_type,
            "Access token issued"
        );
        crate::telemetry::record_token_issued(grant_type);

        IssuedToken {
            access_token: token.access_token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: self.config.token_expire.num_seconds(),
            refresh_token: token.refresh_token,
            scope: token.scope,
        }
    }
}

/// Log and count a protocol rejection
fn reject(err: OAuthError) -> GrantryError {
    tracing::debug!(error = err.code(), "OAuth request rejected");
    crate::telemetry::record_oauth_error(err.code());
    err.into()
}

/// The registered URI must equal the supplied one with its query removed
fn redirect_matches(client: &Client, redirect_uri: &str) -> bool {
    let base = redirect_uri.split('?').next().unwrap_or_default();
    !base.is_empty() && client.redirect_uri == base
}

/// `Bearer <token>`, exactly two whitespace-separated parts
fn parse_bearer(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Apply an optional narrowing of the granted scope
fn narrow_scope(granted: &str, requested: Option<&str>) -> Result<String> {
    match requested.filter(|s| !s.is_empty()) {
        None => Ok(granted.to_string()),
        Some(requested) => {
            if !scope::is_subset(requested, granted) {
                return Err(reject(OAuthError::InvalidScope));
            }
            let scopes = scope::parse_scopes(requested).map_err(reject)?;
            Ok(scope::join_scopes(&scopes))
        }
    }
}

/// Absolute http(s) URL without a fragment
fn is_valid_redirect_uri(uri: &str) -> bool {
    if uri.is_empty() || uri.len() > 2048 {
        return false;
    }

    match url::Url::parse(uri) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some()
                && parsed.fragment().is_none()
        }
        Err(_) => false,
    }
}
