//! Error types for Grantry
//!
//! This module provides the error hierarchy using thiserror.
//! Protocol failures are classified as [`OAuthError`] and are never folded
//! into the generic storage or configuration errors.

use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for Grantry operations
#[derive(Error, Debug)]
pub enum GrantryError {
    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Terminal states of authorization and token validation.
///
/// The set is closed: every protocol-layer failure is reported as exactly one
/// of these, carrying a stable machine-readable code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthError {
    #[error("Client authentication failed.")]
    InvalidClient,

    #[error(
        "The authorization server does not support obtaining an authorization code using this method."
    )]
    UnsupportedResponseType,

    #[error("Invalid redirect uri.")]
    InvalidRedirectUri,

    #[error("The requested scope is invalid, unknown, or malformed.")]
    InvalidScope,

    #[error(
        "The provided authorization grant or refresh token is invalid, expired, revoked, or was issued to another client."
    )]
    InvalidGrant,

    #[error("The authorization grant type is not supported by the authorization server.")]
    UnsupportedGrantType,

    #[error(
        "The provided authorization token is invalid, expired, revoked, or was issued to another client."
    )]
    InvalidToken,

    #[error("You need to be authorized to access the requested resource.")]
    NotAuthorized,
}

impl OAuthError {
    /// Stable wire code, used as the `error` field of JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::InvalidRedirectUri => "invalid_redirect_uri",
            OAuthError::InvalidScope => "invalid_scope",
            OAuthError::InvalidGrant => "invalid_grant",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::InvalidToken => "invalid_token",
            OAuthError::NotAuthorized => "not_authorized",
        }
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// HTTP status the error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient | OAuthError::InvalidToken | OAuthError::NotAuthorized => {
                StatusCode::UNAUTHORIZED
            }
            OAuthError::UnsupportedResponseType
            | OAuthError::InvalidRedirectUri
            | OAuthError::InvalidScope
            | OAuthError::InvalidGrant
            | OAuthError::UnsupportedGrantType => StatusCode::BAD_REQUEST,
        }
    }
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Connection error: {0}")]
    Connection(String),
}

// Implement From for sqlx::Error
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<sqlx::Error> for GrantryError {
    fn from(err: sqlx::Error) -> Self {
        GrantryError::Storage(StorageError::from(err))
    }
}

impl From<sqlx::migrate::MigrateError> for GrantryError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        GrantryError::Storage(StorageError::Database(format!(
            "Failed to run migrations: {}",
            err
        )))
    }
}

/// Convenient result type for Grantry operations
pub type Result<T> = std::result::Result<T, GrantryError>;

impl GrantryError {
    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        GrantryError::Validation(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GrantryError::Config(msg.into())
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        GrantryError::Storage(StorageError::Database(msg.into()))
    }

    /// Create a not found error
    #[inline]
    pub fn not_found<E: Into<String>, I: Into<String>>(entity: E, id: I) -> Self {
        GrantryError::Storage(StorageError::NotFound {
            entity: entity.into(),
            id: id.into(),
        })
    }

    /// The protocol error this wraps, if any
    pub fn oauth(&self) -> Option<OAuthError> {
        match self {
            GrantryError::OAuth(e) => Some(*e),
            _ => None,
        }
    }
}
