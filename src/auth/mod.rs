//! OAuth 2.0 authorization provider
//!
//! - **Provider**: validates requests, issues grants and tokens
//! - **Server**: axum routes for the authorization, token and revocation endpoints
//! - **Middleware**: bearer-token guard and extractor for protected resources

pub mod middleware;
pub mod provider;
pub mod random;
pub mod request;
pub mod scope;
pub mod server;

pub use middleware::{ScopeGuard, require_scopes};
pub use provider::{
    AuthorizationProvider, AuthorizedUser, ClientRegistration, GrantSource, IssuedToken,
    ProviderConfig, ValidatedTokenRequest,
};
pub use request::{AuthorizationRequest, TokenGrant, TokenRequest};
pub use scope::Scope;
pub use server::{OAuthServerState, create_oauth_routes};
