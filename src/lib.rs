//! Grantry - OAuth2 authorization provider
//!
//! Issues short-lived authorization codes, exchanges them for bearer access
//! tokens paired with long-lived refresh tokens, and resolves bearer tokens
//! back to the user and scopes behind them. It can be:
//! - Used as a library, guarding routes of another axum service
//! - Run as a CLI tool (`grantry` binary) managing clients
//! - Exposed as an HTTP authorization server
//!
//! # Example
//!
//! ```rust,no_run
//! use grantry::auth::{AuthorizationProvider, ProviderConfig, TokenRequest};
//! use grantry::storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = AuthorizationProvider::new(
//!         Arc::new(MemoryStorage::new()),
//!         ProviderConfig::default(),
//!     );
//!
//!     let code = provider
//!         .generate_grant("client-id", "user-1", "https://app.example/cb", "review")
//!         .await?;
//!     let issued = provider
//!         .exchange_token(&TokenRequest::authorization_code(
//!             "client-id",
//!             "client-secret",
//!             &code,
//!             "https://app.example/cb",
//!         ))
//!         .await?;
//!     println!("{}", issued.access_token);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Infrastructure
pub mod config;
pub mod storage;
pub mod telemetry;

// Interface layers
pub mod auth;
pub mod cli;
pub mod http;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use auth::{AuthorizationProvider, AuthorizedUser, ProviderConfig, Scope};
pub use error::{GrantryError, OAuthError, Result};

/// Initialize logging for the application
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "grantry=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
