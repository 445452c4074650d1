//! Bearer-token middleware for protected resources
//!
//! [`require_scopes`] resolves the `Authorization` header through the
//! provider and stores the [`AuthorizedUser`] in request extensions, where
//! handlers pick it up with the extractor below.

use super::provider::{AuthorizationProvider, AuthorizedUser};
use super::scope::Scope;
use crate::GrantryError;
use crate::http::AppError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Middleware state: the provider and the scopes a route requires
#[derive(Clone)]
pub struct ScopeGuard {
    pub provider: Arc<AuthorizationProvider>,
    pub required: Vec<Scope>,
}

impl ScopeGuard {
    pub fn new(provider: Arc<AuthorizationProvider>, required: &[Scope]) -> Self {
        Self {
            provider,
            required: required.to_vec(),
        }
    }
}

/// Reject requests without a valid bearer token carrying the guard's scopes.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn require_scopes(
    State(guard): State<ScopeGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user = guard
        .provider
        .get_authorized_user(authorization.as_deref(), &guard.required)
        .await?;

    tracing::debug!(user_id = %user.user_id, client_id = %user.client_id, "Bearer token accepted");
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Extractor for the user resolved by [`require_scopes`]
impl<S> FromRequestParts<S> for AuthorizedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthorizedUser>().cloned().ok_or_else(|| {
            AppError::from(GrantryError::config(
                "Route is not behind the bearer token middleware",
            ))
        })
    }
}
