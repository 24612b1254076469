use super::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn explicit_base_dir_wins() {
    let dir = PathBuf::from("/tmp/storefront-override");
    let resolved = resolve_base_dir(Some(dir.clone())).expect("should resolve override");
    assert_eq!(resolved, dir);
}

#[test]
fn config_file_persistence() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("config.toml");

    let original_config = Config {
        ollama: OllamaConfig {
            protocol: "https".to_string(),
            host: "test-host".to_string(),
            port: 8080,
            model: "test-model".to_string(),
            chat_model: "test-chat".to_string(),
            batch_size: 32,
            timeout_seconds: 20,
        },
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    let toml_content = toml::to_string_pretty(&original_config)
        .expect("config should convert to toml string successfully");
    fs::write(&config_path, toml_content).expect("should write to config_path successfully");

    let loaded_config = Config::load(temp_dir.path()).expect("should load config");

    assert_eq!(original_config, loaded_config);
}

#[test]
fn invalid_toml_handling() {
    let invalid_toml = r#"
        [ollama
        host = "localhost"
        port = "invalid_port"
    "#;

    let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
    assert!(result.is_err());
}

#[test]
fn config_error_converts_to_rag_error() {
    let err: crate::RagError = ConfigError::InvalidTotalK(0).into();
    assert_eq!(err.kind(), "config");
}
