//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be properly loaded,
//! validated, and processed with path expansion.

use convodesk_engine::config::{CompletionProvider, Config};
use sdk::errors::ConvoError;
use std::fs;
use tempfile::TempDir;

fn toml_with_data_dir(dir: &TempDir, extra: &str) -> String {
    format!(
        r#"
[core]
log_level = "debug"
data_dir = "{}"
{}
"#,
        dir.path().join("data").display(),
        extra
    )
}

#[test]
fn test_config_toml_parsing() {
    let dir = TempDir::new().unwrap();
    let toml_content = toml_with_data_dir(
        &dir,
        r#"
[completion]
provider = "offline"
timeout_secs = 15

[chat]
template_path = "/tmp/template.convo"
"#,
    );

    let config = Config::from_toml_str(&toml_content).unwrap();
    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.completion.provider, CompletionProvider::Offline);
    assert_eq!(config.completion.timeout_secs, 15);
    assert_eq!(
        config.chat.template_path.as_deref(),
        Some(std::path::Path::new("/tmp/template.convo"))
    );
    assert!(dir.path().join("data").exists());
    assert_eq!(config.database_path(), dir.path().join("data").join("convodesk.db"));
}

#[test]
fn test_missing_sections_use_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::from_toml_str(&toml_with_data_dir(&dir, "")).unwrap();

    assert_eq!(config.completion.provider, CompletionProvider::Http);
    assert!(config.completion.base_url.starts_with("https://"));
    assert!(config.completion.timeout_secs > 0);
    assert!(config.chat.template_path.is_none());
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();

    let bad_level = format!(
        "[core]\nlog_level = \"loud\"\ndata_dir = \"{}\"\n",
        dir.path().display()
    );
    assert!(matches!(
        Config::from_toml_str(&bad_level),
        Err(ConvoError::Config(_))
    ));

    let zero_timeout = toml_with_data_dir(&dir, "[completion]\ntimeout_secs = 0\n");
    assert!(Config::from_toml_str(&zero_timeout).is_err());

    let bad_url = toml_with_data_dir(&dir, "[completion]\nbase_url = \"ftp://example.com\"\n");
    assert!(Config::from_toml_str(&bad_url).is_err());

    // Offline provider never contacts the URL
    let offline = toml_with_data_dir(
        &dir,
        "[completion]\nprovider = \"offline\"\nbase_url = \"unused\"\n",
    );
    assert!(Config::from_toml_str(&offline).is_ok());

    assert!(Config::from_toml_str("not = [valid").is_err());
}

#[test]
fn test_load_from_path_and_template() {
    let dir = TempDir::new().unwrap();
    let template_path = dir.path().join("todo.convo");
    fs::write(&template_path, "> system\nYou manage todos\n").unwrap();

    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        toml_with_data_dir(
            &dir,
            &format!("[chat]\ntemplate_path = \"{}\"\n", template_path.display()),
        ),
    )
    .unwrap();

    let config = Config::load_or_create_at(&config_path).unwrap();
    assert_eq!(
        config.load_template().unwrap().as_deref(),
        Some("> system\nYou manage todos\n")
    );

    let missing = Config::load_from_path(&dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(ConvoError::Config(_))));
}

#[test]
fn test_round_trip_through_toml() {
    let dir = TempDir::new().unwrap();
    let config = Config::from_toml_str(&toml_with_data_dir(&dir, "")).unwrap();

    let reparsed = Config::from_toml_str(&config.to_toml().unwrap()).unwrap();
    assert_eq!(reparsed.core.data_dir, config.core.data_dir);
    assert_eq!(reparsed.completion.base_url, config.completion.base_url);
}
