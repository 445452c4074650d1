use super::*;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.storage.driver, "sqlite");
    assert!(config.storage.dsn.ends_with("grantry.db"));

    let http = config.http_config();
    assert_eq!(http.port, DEFAULT_HTTP_PORT);
    assert_eq!(http.user_header, "x-user-id");

    let oauth = config.oauth_settings();
    assert_eq!(oauth.token_length, 40);
    assert_eq!(oauth.grant_expire, 60);
    assert_eq!(oauth.token_expire, 3600);
    assert!(config.validate().is_ok());
}

#[test]
fn test_provider_config_from_settings() {
    let mut config = Config::default();
    config.oauth = Some(OAuthSettings {
        token_length: 64,
        grant_expire: 30,
        token_expire: 120,
        token_retention: 0,
    });

    let provider = config.provider_config();
    assert_eq!(provider.token_length, 64);
    assert_eq!(provider.grant_expire.num_seconds(), 30);
    assert_eq!(provider.token_expire.num_seconds(), 120);
    assert_eq!(config.token_retention().num_seconds(), 0);
}

#[test]
fn test_missing_sections_use_defaults() {
    let config: Config = serde_json::from_str(r#"{"storage": {"driver": "memory"}}"#).unwrap();
    assert!(config.validate().is_ok());
    assert!(config.http.is_none());
    assert_eq!(config.http_config().host, "127.0.0.1");
    assert_eq!(config.provider_config().token_length, 40);
}

#[test]
fn test_partial_oauth_section() {
    let config: Config = serde_json::from_str(
        r#"{"storage": {"driver": "memory"}, "oauth": {"tokenExpire": 900}}"#,
    )
    .unwrap();
    let oauth = config.oauth_settings();
    assert_eq!(oauth.token_expire, 900);
    assert_eq!(oauth.grant_expire, 60);
    assert_eq!(oauth.token_retention, DEFAULT_TOKEN_RETENTION_SECS);
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    config.storage.driver = String::new();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.storage.driver = "mongo".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.storage.dsn = String::new();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.http.as_mut().unwrap().port = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.http.as_mut().unwrap().user_header = "bad header".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.http.as_mut().unwrap().allowed_origins = Some(vec!["example.com".to_string()]);
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.oauth.as_mut().unwrap().token_length = 8;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.oauth.as_mut().unwrap().grant_expire = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.oauth.as_mut().unwrap().token_expire = -1;
    assert!(config.validate().is_err());
}

#[test]
fn test_env_overrides() {
    let mut config: Config = serde_json::from_str(r#"{"storage": {"driver": "memory"}}"#).unwrap();
    config
        .apply_overrides_from(lookup_from(&[
            ("OAUTH_TOKEN_LENGTH", "64"),
            ("OAUTH_GRANT_EXPIRE", "30"),
            ("OAUTH_TOKEN_EXPIRE", "7200"),
            ("GRANTRY_STORAGE_DRIVER", "sqlite"),
            ("GRANTRY_STORAGE_DSN", "/tmp/grantry-test.db"),
            ("GRANTRY_HTTP_PORT", "9000"),
        ]))
        .unwrap();

    assert_eq!(config.storage.driver, "sqlite");
    assert_eq!(config.storage.dsn, "/tmp/grantry-test.db");
    let http = config.http.as_ref().unwrap();
    assert_eq!(http.port, 9000);
    assert_eq!(http.host, "127.0.0.1");

    let provider = config.provider_config();
    assert_eq!(provider.token_length, 64);
    assert_eq!(provider.grant_expire.num_seconds(), 30);
    assert_eq!(provider.token_expire.num_seconds(), 7200);
}

#[test]
fn test_env_override_rejects_garbage() {
    let mut config = Config::default();
    let err = config
        .apply_overrides_from(lookup_from(&[("OAUTH_TOKEN_EXPIRE", "soon")]))
        .unwrap_err();
    assert!(err.to_string().contains("OAUTH_TOKEN_EXPIRE"));
}

#[test]
fn test_no_overrides_leaves_config_untouched() {
    let mut config: Config = serde_json::from_str(r#"{"storage": {"driver": "memory"}}"#).unwrap();
    config.apply_overrides_from(lookup_from(&[])).unwrap();
    assert!(config.http.is_none());
    assert!(config.oauth.is_none());
}

#[test]
fn test_config_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("test_config.json");

    let config_content = r#"
{
    "storage": {
        "driver": "sqlite",
        "dsn": ":memory:"
    },
    "http": {
        "host": "localhost",
        "port": 3001,
        "userHeader": "x-forwarded-user"
    },
    "oauth": {
        "tokenLength": 48
    }
}
"#;

    fs::write(&config_path, config_content).unwrap();
    let config = Config::load_from_path(&config_path).unwrap();
    assert_eq!(config.storage.dsn, ":memory:");
    let http = config.http_config();
    assert_eq!(http.port, 3001);
    assert_eq!(http.user_header, "x-forwarded-user");
    assert_eq!(config.provider_config().token_length, 48);
}

#[test]
fn test_config_yaml_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("grantry.yaml");

    let mut config = Config::default();
    config.storage.dsn = "/var/lib/grantry.db".to_string();
    config.save_to_path(&config_path).unwrap();

    let loaded = Config::load_from_path(&config_path).unwrap();
    assert_eq!(loaded.storage.dsn, "/var/lib/grantry.db");
    assert_eq!(loaded.oauth_settings().token_expire, 3600);
}

#[test]
fn test_missing_file_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_from_path(temp_dir.path().join("absent.json")).unwrap();
    assert_eq!(config.storage.driver, "sqlite");
}

#[test]
fn test_invalid_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.json");
    fs::write(&config_path, "{ not json").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, GrantryError::Config(_)));
}
