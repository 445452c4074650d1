//! Constants used throughout Grantry
//!
//! Configuration defaults, generated-credential lengths, and the wire strings
//! of the authorization protocol.

use once_cell::sync::Lazy;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Get the home directory with fallback to current directory
pub fn get_home_dir() -> &'static str {
    static HOME_DIR: Lazy<String> = Lazy::new(|| {
        dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string())
    });
    &HOME_DIR
}

/// Default config directory (~/.grantry)
pub fn default_config_dir() -> &'static str {
    static CONFIG_DIR: Lazy<String> = Lazy::new(|| format!("{}/.grantry", get_home_dir()));
    &CONFIG_DIR
}

/// Default SQLite DSN (~/.grantry/grantry.db)
pub fn default_sqlite_dsn() -> &'static str {
    static SQLITE_DSN: Lazy<String> =
        Lazy::new(|| format!("{}/grantry.db", default_config_dir()));
    &SQLITE_DSN
}

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "grantry.config.json";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 3340;

/// Default HTTP host
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Header a fronting login layer sets to the authenticated resource owner
pub const DEFAULT_USER_HEADER: &str = "x-user-id";

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Generated code/token length override
pub const ENV_OAUTH_TOKEN_LENGTH: &str = "OAUTH_TOKEN_LENGTH";

/// Grant lifetime override (seconds)
pub const ENV_OAUTH_GRANT_EXPIRE: &str = "OAUTH_GRANT_EXPIRE";

/// Access token lifetime override (seconds)
pub const ENV_OAUTH_TOKEN_EXPIRE: &str = "OAUTH_TOKEN_EXPIRE";

/// Storage driver override
pub const ENV_STORAGE_DRIVER: &str = "GRANTRY_STORAGE_DRIVER";

/// Storage DSN override
pub const ENV_STORAGE_DSN: &str = "GRANTRY_STORAGE_DSN";

/// HTTP host override
pub const ENV_HTTP_HOST: &str = "GRANTRY_HTTP_HOST";

/// HTTP port override
pub const ENV_HTTP_PORT: &str = "GRANTRY_HTTP_PORT";

// ============================================================================
// OAUTH
// ============================================================================

/// Default length of authorization codes and access/refresh tokens
pub const DEFAULT_TOKEN_LENGTH: usize = 40;

/// Default grant lifetime in seconds
pub const DEFAULT_GRANT_EXPIRE_SECS: i64 = 60;

/// Default access token lifetime in seconds
pub const DEFAULT_TOKEN_EXPIRE_SECS: i64 = 3600;

/// Default retention of expired tokens before `gc` removes them (30 days)
pub const DEFAULT_TOKEN_RETENTION_SECS: i64 = 30 * 24 * 3600;

/// Generated client id length
pub const CLIENT_ID_LENGTH: usize = 20;

/// Generated client secret length
pub const CLIENT_SECRET_LENGTH: usize = 40;

/// Attempts at generating a unique authorization code before giving up
pub const GRANT_CODE_ATTEMPTS: usize = 3;

/// Token type reported by the token endpoint
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Authorization scheme expected in the `Authorization` header
pub const BEARER_SCHEME: &str = "Bearer";

/// The only supported response type
pub const RESPONSE_TYPE_CODE: &str = "code";

/// `grant_type` value for code exchange
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

/// `grant_type` value for refresh
pub const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";
