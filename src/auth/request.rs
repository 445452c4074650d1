//! Request parameter types for the authorization and token endpoints
//!
//! Raw form/query fields are kept optional so that missing values are
//! classified by the provider into the protocol error taxonomy instead of
//! being rejected by the extractor.

use crate::constants::{GRANT_TYPE_AUTHORIZATION_CODE, GRANT_TYPE_REFRESH_TOKEN};
use crate::error::OAuthError;
use serde::{Deserialize, Serialize};

/// Parameters of `GET/POST /oauth/authorize`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    #[serde(default)]
    pub response_type: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl AuthorizationRequest {
    pub fn new(
        client_id: impl Into<String>,
        response_type: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: Option<&str>,
    ) -> Self {
        Self {
            response_type: Some(response_type.into()),
            client_id: Some(client_id.into()),
            redirect_uri: Some(redirect_uri.into()),
            scope: scope.map(String::from),
            state: None,
        }
    }
}

/// Form body of `POST /oauth/token`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Optional narrowing of the issued scope
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenRequest {
    /// Authorization-code exchange request
    pub fn authorization_code(
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Self {
        Self {
            grant_type: Some(GRANT_TYPE_AUTHORIZATION_CODE.to_string()),
            client_id: Some(client_id.to_string()),
            client_secret: Some(client_secret.to_string()),
            redirect_uri: Some(redirect_uri.to_string()),
            code: Some(code.to_string()),
            ..Default::default()
        }
    }

    /// Refresh request
    pub fn refresh_token(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            grant_type: Some(GRANT_TYPE_REFRESH_TOKEN.to_string()),
            client_id: Some(client_id.to_string()),
            client_secret: Some(client_secret.to_string()),
            refresh_token: Some(refresh_token.to_string()),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    /// Classify the grant. Only called after the client is authenticated.
    pub fn grant(&self) -> Result<TokenGrant, OAuthError> {
        match self.grant_type.as_deref() {
            Some(GRANT_TYPE_AUTHORIZATION_CODE) => Ok(TokenGrant::AuthorizationCode {
                code: non_empty(&self.code).ok_or(OAuthError::InvalidGrant)?,
                redirect_uri: self.redirect_uri.clone().unwrap_or_default(),
            }),
            Some(GRANT_TYPE_REFRESH_TOKEN) => Ok(TokenGrant::RefreshToken {
                refresh_token: non_empty(&self.refresh_token).ok_or(OAuthError::InvalidGrant)?,
            }),
            _ => Err(OAuthError::UnsupportedGrantType),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

/// The two supported grant kinds, each with the fields it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken { refresh_token: String },
}

impl TokenGrant {
    /// Wire name, also used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            TokenGrant::AuthorizationCode { .. } => GRANT_TYPE_AUTHORIZATION_CODE,
            TokenGrant::RefreshToken { .. } => GRANT_TYPE_REFRESH_TOKEN,
        }
    }
}
