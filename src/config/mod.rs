//! Configuration management for Grantry
//!
//! Loads configuration from grantry.config.json (or YAML), then applies
//! environment overrides.

use crate::auth::ProviderConfig;
use crate::constants::*;
use crate::{GrantryError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete Grantry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Storage configuration (required)
    pub storage: StorageConfig,

    /// HTTP server configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// Authorization provider settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthSettings>,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Driver name (sqlite, postgres, memory)
    pub driver: String,

    /// Data source name / connection string
    #[serde(default)]
    pub dsn: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins (e.g., ["https://example.com"])
    /// If not specified, defaults to localhost origins for development
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,

    /// Header set by the fronting login layer to the authenticated user id
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: None,
            user_header: default_user_header(),
        }
    }
}

/// Authorization provider settings. Durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSettings {
    /// Length of generated codes and tokens
    #[serde(default = "default_token_length")]
    pub token_length: usize,

    /// Authorization code lifetime
    #[serde(default = "default_grant_expire")]
    pub grant_expire: i64,

    /// Access token lifetime
    #[serde(default = "default_token_expire")]
    pub token_expire: i64,

    /// How long expired tokens are kept before `gc` removes them
    #[serde(default = "default_token_retention")]
    pub token_retention: i64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            token_length: default_token_length(),
            grant_expire: default_grant_expire(),
            token_expire: default_token_expire(),
            token_retention: default_token_retention(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

fn default_host() -> String {
    DEFAULT_HTTP_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_user_header() -> String {
    DEFAULT_USER_HEADER.to_string()
}

fn default_token_length() -> usize {
    DEFAULT_TOKEN_LENGTH
}

fn default_grant_expire() -> i64 {
    DEFAULT_GRANT_EXPIRE_SECS
}

fn default_token_expire() -> i64 {
    DEFAULT_TOKEN_EXPIRE_SECS
}

fn default_token_retention() -> i64 {
    DEFAULT_TOKEN_RETENTION_SECS
}

impl Config {
    /// Load configuration from the default file and the process environment
    pub fn load() -> Result<Self> {
        Self::load_with_env(CONFIG_FILE_NAME)
    }

    /// Load from `path`, apply environment overrides, validate
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from specific path
    ///
    /// Supports both JSON and YAML formats based on file extension:
    /// - `.json` files are parsed as JSON
    /// - `.yaml` or `.yml` files are parsed as YAML
    /// - Files without extension default to JSON parsing
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // Return default config if file doesn't exist
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;

        let config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                GrantryError::config(format!("Failed to parse YAML config: {}", e))
            })?,
            _ => serde_json::from_str(&content).map_err(|e| {
                GrantryError::config(format!("Failed to parse JSON config: {}", e))
            })?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to specific path, JSON or YAML by extension
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = match path_ref.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => serde_json::to_string_pretty(self)?,
        };

        std::fs::write(path_ref, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(driver) = lookup(ENV_STORAGE_DRIVER) {
            self.storage.driver = driver;
        }
        if let Some(dsn) = lookup(ENV_STORAGE_DSN) {
            self.storage.dsn = dsn;
        }

        let host = lookup(ENV_HTTP_HOST);
        let port = lookup(ENV_HTTP_PORT)
            .map(|v| parse_env::<u16>(ENV_HTTP_PORT, &v))
            .transpose()?;
        if host.is_some() || port.is_some() {
            let http = self.http.get_or_insert_with(HttpConfig::default);
            if let Some(host) = host {
                http.host = host;
            }
            if let Some(port) = port {
                http.port = port;
            }
        }

        let token_length = lookup(ENV_OAUTH_TOKEN_LENGTH)
            .map(|v| parse_env::<usize>(ENV_OAUTH_TOKEN_LENGTH, &v))
            .transpose()?;
        let grant_expire = lookup(ENV_OAUTH_GRANT_EXPIRE)
            .map(|v| parse_env::<i64>(ENV_OAUTH_GRANT_EXPIRE, &v))
            .transpose()?;
        let token_expire = lookup(ENV_OAUTH_TOKEN_EXPIRE)
            .map(|v| parse_env::<i64>(ENV_OAUTH_TOKEN_EXPIRE, &v))
            .transpose()?;

        if token_length.is_some() || grant_expire.is_some() || token_expire.is_some() {
            let oauth = self.oauth.get_or_insert_with(OAuthSettings::default);
            if let Some(v) = token_length {
                oauth.token_length = v;
            }
            if let Some(v) = grant_expire {
                oauth.grant_expire = v;
            }
            if let Some(v) = token_expire {
                oauth.token_expire = v;
            }
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate storage driver is supported
        match self.storage.driver.as_str() {
            "sqlite" | "postgres" => {
                if self.storage.dsn.is_empty() {
                    return Err(GrantryError::config("storage.dsn is required"));
                }
            }
            "memory" => {}
            "" => return Err(GrantryError::config("storage.driver is required")),
            other => {
                return Err(GrantryError::config(format!(
                    "Unsupported storage driver: '{}'. Supported: sqlite, postgres, memory",
                    other
                )));
            }
        }

        if let Some(ref http) = self.http {
            // Upper bound is enforced by u16
            if http.port == 0 {
                return Err(GrantryError::config("http.port must be nonzero (1-65535)"));
            }

            if http.host.is_empty() {
                return Err(GrantryError::config("http.host cannot be empty"));
            }

            if http.user_header.is_empty()
                || axum::http::HeaderName::from_bytes(http.user_header.as_bytes()).is_err()
            {
                return Err(GrantryError::config(format!(
                    "http.userHeader '{}' is not a valid header name",
                    http.user_header
                )));
            }

            if let Some(ref origins) = http.allowed_origins {
                for origin in origins {
                    // Basic URL validation - must start with http:// or https://
                    if !origin.starts_with("http://") && !origin.starts_with("https://") {
                        return Err(GrantryError::config(format!(
                            "Invalid CORS origin '{}': must start with http:// or https://",
                            origin
                        )));
                    }
                }
            }
        }

        if let Some(ref oauth) = self.oauth {
            if !(20..=255).contains(&oauth.token_length) {
                return Err(GrantryError::config(
                    "oauth.tokenLength must be between 20 and 255",
                ));
            }
            if oauth.grant_expire <= 0 {
                return Err(GrantryError::config(
                    "oauth.grantExpire must be greater than 0",
                ));
            }
            if oauth.token_expire <= 0 {
                return Err(GrantryError::config(
                    "oauth.tokenExpire must be greater than 0",
                ));
            }
            if oauth.token_retention < 0 {
                return Err(GrantryError::config(
                    "oauth.tokenRetention cannot be negative",
                ));
            }
        }

        Ok(())
    }

    /// HTTP settings, defaulted when the section is absent
    pub fn http_config(&self) -> HttpConfig {
        self.http.clone().unwrap_or_default()
    }

    /// Provider settings, defaulted when the section is absent
    pub fn oauth_settings(&self) -> OAuthSettings {
        self.oauth.clone().unwrap_or_default()
    }

    /// Immutable provider configuration
    pub fn provider_config(&self) -> ProviderConfig {
        let oauth = self.oauth_settings();
        ProviderConfig {
            token_length: oauth.token_length,
            grant_expire: chrono::Duration::seconds(oauth.grant_expire),
            token_expire: chrono::Duration::seconds(oauth.token_expire),
        }
    }

    /// Retention window used by `gc`
    pub fn token_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.oauth_settings().token_retention)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GrantryError::config(format!("{} has an invalid value: '{}'", key, value)))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                driver: "sqlite".to_string(),
                dsn: default_sqlite_dsn().to_string(),
            },
            http: Some(HttpConfig::default()),
            oauth: Some(OAuthSettings::default()),
            log: Some(LogConfig {
                level: Some("info".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod config_test;
