//! OAuth 2.0 authorization server endpoints
//!
//! Authorization-code and refresh-token grants. The consent UI and the user
//! login are external: the UI reads the JSON from `GET /oauth/authorize` and
//! posts the resource owner's decision back, with the owner identified by a
//! header set by the fronting session layer.

use super::middleware::{ScopeGuard, require_scopes};
use super::provider::{AuthorizationProvider, AuthorizedUser};
use super::request::{AuthorizationRequest, TokenRequest};
use super::scope::{self, Scope};
use crate::error::OAuthError;
use crate::http::AppError;
use crate::{GrantryError, Result};
use axum::{
    Form, Json, Router,
    extract::{Path, Query, State, rejection::FormRejection},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Shared state of the OAuth routes
#[derive(Clone)]
pub struct OAuthServerState {
    pub provider: Arc<AuthorizationProvider>,
    /// Header carrying the authenticated resource owner's id
    pub user_header: HeaderName,
}

impl OAuthServerState {
    pub fn new(provider: Arc<AuthorizationProvider>, user_header: &str) -> Result<Self> {
        let user_header = HeaderName::from_bytes(user_header.as_bytes()).map_err(|e| {
            GrantryError::config(format!("Invalid user header '{}': {}", user_header, e))
        })?;
        Ok(Self {
            provider,
            user_header,
        })
    }

    fn resource_owner(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.user_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }
}

/// Consent decision posted by the UI
#[derive(Debug, Deserialize)]
struct ConsentForm {
    #[serde(default)]
    action: Option<String>,
}

/// Revocation form (RFC 7009 field names)
#[derive(Debug, Deserialize)]
struct RevokeForm {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// One entry of `GET /oauth/tokens`; token values are never exposed
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationSummary {
    client_id: String,
    client_name: Option<String>,
    scope: String,
    expires: DateTime<Utc>,
}

/// Create OAuth server routes
pub fn create_oauth_routes(state: OAuthServerState) -> Router {
    let guard = ScopeGuard::new(state.provider.clone(), &[Scope::User]);

    let protected = Router::new()
        .route("/oauth/tokens", get(handle_list_tokens))
        .route("/oauth/tokens/{client_id}", delete(handle_revoke_authorization))
        .route_layer(axum::middleware::from_fn_with_state(guard, require_scopes));

    Router::new()
        .route(
            "/oauth/authorize",
            get(handle_authorize).post(handle_authorize_decision),
        )
        .route("/oauth/token", post(handle_token))
        .route("/oauth/revoke", post(handle_revoke))
        .merge(protected)
        .with_state(Arc::new(state))
}

/// Validate an authorization request and describe it for the consent UI
async fn handle_authorize(
    State(state): State<Arc<OAuthServerState>>,
    Query(req): Query<AuthorizationRequest>,
) -> std::result::Result<Json<Value>, AppError> {
    let client = state.provider.validate_authorization_request(&req).await?;

    let requested = req.scope.clone().unwrap_or_default();
    let scopes: Vec<Value> = scope::stored_scopes(&requested)
        .into_iter()
        .map(|s| json!({ "name": s.as_str(), "description": s.description() }))
        .collect();

    Ok(Json(json!({
        "client_id": client.client_id,
        "client_name": client.name,
        "client_description": client.description,
        "client_website": client.website,
        "scope": requested,
        "scopes": scopes,
        "state": req.state,
    })))
}

/// Record the resource owner's decision and send the user agent back
async fn handle_authorize_decision(
    State(state): State<Arc<OAuthServerState>>,
    headers: HeaderMap,
    Query(req): Query<AuthorizationRequest>,
    Form(form): Form<ConsentForm>,
) -> std::result::Result<Response, AppError> {
    let user_id = state
        .resource_owner(&headers)
        .ok_or(OAuthError::NotAuthorized)?;

    let client = state.provider.validate_authorization_request(&req).await?;
    // Validation guarantees a redirect URI matching the registered one
    let redirect_uri = req.redirect_uri.as_deref().unwrap_or(&client.redirect_uri);

    let mut target = url::Url::parse(redirect_uri)
        .map_err(|e| GrantryError::validation(format!("Malformed redirect uri: {}", e)))?;

    match form.action.as_deref() {
        Some("approve") => {
            let scope = match req.scope.as_deref().filter(|s| !s.is_empty()) {
                Some(requested) => scope::join_scopes(&scope::parse_scopes(requested)?),
                None => String::new(),
            };
            let code = state
                .provider
                .generate_grant(&client.client_id, &user_id, redirect_uri, &scope)
                .await?;
            target.query_pairs_mut().append_pair("code", &code);
        }
        Some("deny") => {
            tracing::info!(client_id = %client.client_id, user_id = %user_id, "Authorization denied by resource owner");
            target
                .query_pairs_mut()
                .append_pair("error", "access_denied")
                .append_pair(
                    "error_description",
                    "The resource owner denied the request.",
                );
        }
        _ => {
            return Err(GrantryError::validation("action must be 'approve' or 'deny'").into());
        }
    }

    if let Some(ref st) = req.state {
        target.query_pairs_mut().append_pair("state", st);
    }

    Ok(Redirect::to(target.as_str()).into_response())
}

/// Token endpoint for both supported grant types
async fn handle_token(
    State(state): State<Arc<OAuthServerState>>,
    form: std::result::Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let exchanged = match form {
        Ok(Form(req)) => state.provider.exchange_token(&req).await,
        Err(rejection) => Err(form_error(rejection)),
    };
    let mut response = match exchanged {
        Ok(issued) => Json(issued).into_response(),
        Err(e) => AppError::from(e).into_response(),
    };

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// Client-authenticated revocation by refresh token
async fn handle_revoke(
    State(state): State<Arc<OAuthServerState>>,
    form: std::result::Result<Form<RevokeForm>, FormRejection>,
) -> std::result::Result<Json<Value>, AppError> {
    let Form(form) = form.map_err(form_error)?;
    let token = form
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GrantryError::validation("token is required"))?;

    state
        .provider
        .revoke_token(
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
            &token,
        )
        .await?;

    Ok(Json(json!({})))
}

/// Malformed or mis-typed form bodies become `invalid_request`
fn form_error(rejection: FormRejection) -> GrantryError {
    GrantryError::validation(rejection.body_text())
}

/// The caller's live authorizations
async fn handle_list_tokens(
    State(state): State<Arc<OAuthServerState>>,
    user: AuthorizedUser,
) -> std::result::Result<Json<Value>, AppError> {
    let tokens = state.provider.authorized_tokens(&user.user_id).await?;

    let mut authorizations = Vec::with_capacity(tokens.len());
    for token in tokens {
        let client_name = state
            .provider
            .storage()
            .get_client(&token.client_id)
            .await?
            .map(|c| c.name);
        authorizations.push(AuthorizationSummary {
            client_id: token.client_id,
            client_name,
            scope: token.scope,
            expires: token.expires,
        });
    }

    Ok(Json(json!({ "tokens": authorizations })))
}

/// The caller withdraws everything they granted to one client
async fn handle_revoke_authorization(
    State(state): State<Arc<OAuthServerState>>,
    Path(client_id): Path<String>,
    user: AuthorizedUser,
) -> std::result::Result<Json<Value>, AppError> {
    let removed = state
        .provider
        .revoke_authorization(&user.user_id, &client_id)
        .await?;
    Ok(Json(json!({ "revoked": removed })))
}
