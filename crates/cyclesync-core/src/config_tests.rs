//! Config module tests

use std::collections::HashMap;

use crate::config::{Config, IdentityConfig, redact_api_key};

fn complete_env() -> HashMap<&'static str, String> {
    HashMap::from([
        ("CYCLESYNC_API_KEY", "key-1234567".to_string()),
        ("CYCLESYNC_AUTH_DOMAIN", "cyclesync.example.com".to_string()),
        ("CYCLESYNC_PROJECT_ID", "cyclesync".to_string()),
        ("CYCLESYNC_STORAGE_BUCKET", "cyclesync.appspot.com".to_string()),
        ("CYCLESYNC_MESSAGING_SENDER_ID", "1234".to_string()),
        ("CYCLESYNC_APP_ID", "1:1234:web:abcd".to_string()),
    ])
}

fn lookup<'a>(env: &'a HashMap<&'static str, String>) -> impl Fn(&str) -> Option<String> + 'a {
    move |name: &str| env.get(name).cloned()
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert!(config.identity.api_key.is_none());
    assert!(config.identity.auth_domain.is_none());
    assert_eq!(
        config.identity.endpoint,
        "https://identitytoolkit.googleapis.com/v1"
    );
    assert_eq!(
        config.identity.token_endpoint,
        "https://securetoken.googleapis.com/v1"
    );
    assert_eq!(config.identity.timeout_secs, 30);
    assert_eq!(config.session.settle_timeout_secs, 10);
}

#[test]
fn test_complete_env_is_configured() {
    let env = complete_env();
    let settings = IdentityConfig::default().resolve_with(lookup(&env)).unwrap();

    assert!(settings.is_configured());
    assert!(settings.missing().is_empty());
}

#[test]
fn test_missing_value_is_not_configured() {
    let mut env = complete_env();
    env.remove("CYCLESYNC_APP_ID");

    let settings = IdentityConfig::default().resolve_with(lookup(&env)).unwrap();

    assert!(!settings.is_configured());
    assert_eq!(settings.missing(), vec!["app_id"]);
}

#[test]
fn test_empty_and_undefined_values_are_missing() {
    let mut env = complete_env();
    env.insert("CYCLESYNC_PROJECT_ID", "   ".to_string());
    env.insert("CYCLESYNC_STORAGE_BUCKET", "undefined".to_string());

    let settings = IdentityConfig::default().resolve_with(lookup(&env)).unwrap();

    assert_eq!(settings.missing(), vec!["project_id", "storage_bucket"]);
}

#[test]
fn test_file_values_fill_in_for_env() {
    let mut env = complete_env();
    env.remove("CYCLESYNC_AUTH_DOMAIN");
    let identity = IdentityConfig {
        auth_domain: Some("from-file.example.com".to_string()),
        ..IdentityConfig::default()
    };

    let settings = identity.resolve_with(lookup(&env)).unwrap();

    assert_eq!(settings.auth_domain.as_deref(), Some("from-file.example.com"));
    assert!(settings.is_configured());
}

#[test]
fn test_env_overrides_endpoint_and_timeout() {
    let mut env = complete_env();
    env.insert("CYCLESYNC_IDENTITY_ENDPOINT", "http://127.0.0.1:9099".to_string());
    env.insert("CYCLESYNC_IDENTITY_TIMEOUT_SECS", "5".to_string());

    let settings = IdentityConfig::default().resolve_with(lookup(&env)).unwrap();

    assert_eq!(settings.endpoint, "http://127.0.0.1:9099");
    assert_eq!(settings.timeout_secs, 5);
}

#[test]
fn test_invalid_timeout_override_is_an_error() {
    let mut env = complete_env();
    env.insert("CYCLESYNC_IDENTITY_TIMEOUT_SECS", "soon".to_string());

    assert!(IdentityConfig::default().resolve_with(lookup(&env)).is_err());
}

#[test]
fn test_stored_api_key_is_rejected() {
    let config: Config = toml::from_str(
        r#"
        [identity]
        api_key = "leaked"
        "#,
    )
    .unwrap();

    assert!(config.validate().is_err());
}

#[test]
fn test_api_key_is_never_serialized() {
    let mut config = Config::default();
    config.identity.api_key = Some("secret".to_string());

    let toml_str = toml::to_string_pretty(&config).unwrap();

    assert!(!toml_str.contains("secret"));
}

#[test]
fn test_set_and_get() {
    let mut config = Config::default();

    config.set("identity.project_id", "cyclesync").unwrap();
    config.set("identity.endpoint", "http://localhost:9099/").unwrap();
    config.set("session.settle_timeout_secs", "3").unwrap();

    assert_eq!(config.get("identity.project_id").unwrap(), "cyclesync");
    assert_eq!(config.get("identity.endpoint").unwrap(), "http://localhost:9099");
    assert_eq!(config.session.settle_timeout_secs, 3);
}

#[test]
fn test_set_empty_clears_optional_value() {
    let mut config = Config::default();
    config.set("identity.app_id", "1:1234:web:abcd").unwrap();

    config.set("identity.app_id", "").unwrap();

    assert!(config.identity.app_id.is_none());
    assert_eq!(config.get("identity.app_id").unwrap(), "(not set)");
}

#[test]
fn test_set_rejects_bad_values() {
    let mut config = Config::default();

    assert!(config.set("identity.api_key", "secret").is_err());
    assert!(config.set("identity.endpoint", "ftp://nope").is_err());
    assert!(config.set("identity.timeout_secs", "0").is_err());
    assert!(config.set("session.settle_timeout_secs", "never").is_err());
    assert!(config.set("unknown.key", "1").is_err());
    assert!(config.get("unknown.key").is_err());
}

#[test]
fn test_list_contains_every_key() {
    let config = Config::default();
    let keys: Vec<String> = config.list().unwrap().into_iter().map(|(k, _)| k).collect();

    assert_eq!(keys.len(), 10);
    assert!(keys.contains(&"identity.api_key".to_string()));
    assert!(keys.contains(&"session.settle_timeout_secs".to_string()));
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut config = Config::default();
    config.set("identity.auth_domain", "cyclesync.example.com").unwrap();

    config.save_to(&path).unwrap();
    let loaded = Config::load_from(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_load_missing_file_returns_default() {
    let dir = tempfile::tempdir().unwrap();

    let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(loaded, Config::default());
}

#[test]
fn test_partial_file_uses_defaults() {
    let config: Config = toml::from_str(
        r#"
        [session]
        settle_timeout_secs = 20
        "#,
    )
    .unwrap();

    assert_eq!(config.session.settle_timeout_secs, 20);
    assert_eq!(config.identity.timeout_secs, 30);
}

#[test]
fn test_redact_api_key_keeps_last_four_chars() {
    assert_eq!(redact_api_key("key-1234567"), "***4567");
    assert_eq!(redact_api_key("abcd"), "***");
    assert_eq!(redact_api_key("clé-secrète"), "***rète");
    assert_eq!(redact_api_key("ключ-ключ"), "***ключ");
}
