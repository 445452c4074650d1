//! Utility functions and helpers
//!
//! Common utilities used throughout Grantry.

use crate::auth::{AuthorizationProvider, ClientRegistration, ProviderConfig};
use crate::config::{Config, StorageConfig};
use crate::model::Client;
use crate::storage::{SqliteStorage, Storage};
use std::sync::Arc;
use tempfile::TempDir;

/// Test environment with an isolated temporary database (test builds only)
///
/// - Temporary `.grantry` directory (auto-cleaned on drop)
/// - SQLite database in the temp directory
/// - Config pointing at that database
/// - A provider built from the config
///
/// # Example
///
/// ```no_run
/// use grantry::utils::TestEnvironment;
///
/// #[tokio::test]
/// async fn my_test() {
///     let env = TestEnvironment::new().await;
///     let client = env.register_client("https://app.example/cb").await;
///     // Cleanup happens automatically when env drops
/// }
/// ```
pub struct TestEnvironment {
    /// Temporary directory - kept alive for test duration
    _temp_dir: TempDir,

    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub provider: Arc<AuthorizationProvider>,
}

impl TestEnvironment {
    /// Create a new isolated test environment with default provider settings
    pub async fn new() -> Self {
        Self::with_provider_config(ProviderConfig::default()).await
    }

    /// Create a test environment with custom provider settings
    pub async fn with_provider_config(provider_config: ProviderConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join(".grantry").join("grantry.db");

        let config = Config {
            storage: StorageConfig {
                driver: "sqlite".to_string(),
                dsn: db_path.to_str().expect("utf-8 temp path").to_string(),
            },
            ..Default::default()
        };

        let storage: Arc<dyn Storage> = Arc::new(
            SqliteStorage::new(&config.storage.dsn)
                .await
                .expect("Failed to create SQLite storage"),
        );
        let provider = Arc::new(AuthorizationProvider::new(
            storage.clone(),
            provider_config,
        ));

        Self {
            _temp_dir: temp_dir,
            config,
            storage,
            provider,
        }
    }

    /// Register a client with generated credentials
    pub async fn register_client(&self, redirect_uri: &str) -> Client {
        self.provider
            .register_client(ClientRegistration {
                name: "Test App".to_string(),
                redirect_uri: redirect_uri.to_string(),
                owner_user_id: "test-owner".to_string(),
                ..Default::default()
            })
            .await
            .expect("Failed to register client")
    }
}
