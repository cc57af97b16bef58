use blobstage_config::{
    ChecksumKind, Config, ConfigError, ConfigFormat, ConfigLoader, StorageConfig, Validator,
};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_load_toml_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blobstage.toml");
    fs::write(
        &path,
        r#"
[transfer]
block_size = 2097152
single_shot_threshold = 1048576
max_concurrency = 4
per_attempt_timeout_ms = 15000
overall_deadline_ms = 600000
checksum = "md5"

[retry]
max_retries = 5
base_delay_ms = 200
max_delay_ms = 5000
jitter = false

[storage]
backend = "local"
root = "/var/lib/blobstage"

[observability]
log_level = "debug"
log_format = "json"
"#,
    )
    .unwrap();

    let config = ConfigLoader::new().load_file(&path).await.unwrap();
    assert_eq!(config.transfer.block_size, 2 * 1024 * 1024);
    assert_eq!(config.transfer.per_attempt_timeout(), Duration::from_secs(15));
    assert_eq!(
        config.transfer.overall_deadline(),
        Some(Duration::from_secs(600))
    );
    assert_eq!(config.retry.max_retries, 5);
    assert!(!config.retry.jitter);
    match config.storage {
        StorageConfig::Local(local) => assert_eq!(local.root, "/var/lib/blobstage"),
        other => panic!("unexpected storage: {:?}", other),
    }
}

#[tokio::test]
async fn test_load_yaml_config() {
    let yaml = r#"
transfer:
  block_size: 8388608
  checksum: crc64
storage:
  backend: azure
  container: media-uploads
  connection_string: "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;"
"#;

    let config = ConfigLoader::new()
        .load_from_string(yaml, ConfigFormat::Yaml)
        .unwrap();
    assert_eq!(config.transfer.block_size, 8 * 1024 * 1024);
    assert_eq!(config.transfer.checksum, ChecksumKind::Crc64);
    assert!(matches!(config.storage, StorageConfig::Azure(_)));
}

#[tokio::test]
async fn test_load_json_memory_backend() {
    let json = r#"{ "storage": { "backend": "memory" }, "transfer": { "max_concurrency": 1 } }"#;
    let config = ConfigLoader::new()
        .load_from_string(json, ConfigFormat::Json)
        .unwrap();
    assert_eq!(config.storage, StorageConfig::Memory);
    assert_eq!(config.transfer.max_concurrency, 1);
}

#[tokio::test]
async fn test_missing_file() {
    let err = ConfigLoader::new()
        .load_file("/definitely/not/here.toml")
        .await
        .unwrap_err();
    assert!(err.is_missing_file());
    assert!(matches!(err, ConfigError::File { .. }));
}

#[tokio::test]
async fn test_validation_rejects_oversized_block() {
    let toml = "[transfer]\nblock_size = 5000000000\n";
    let err = ConfigLoader::new()
        .load_from_string(toml, ConfigFormat::Toml)
        .unwrap_err();
    assert!(err.to_string().contains("transfer.block_size"));
    assert!(matches!(
        err,
        ConfigError::OutOfRange {
            field: "transfer.block_size",
            value: 5_000_000_000,
            ..
        }
    ));

    // The same content loads when validation is disabled
    let config = ConfigLoader::without_validation()
        .load_from_string(toml, ConfigFormat::Toml)
        .unwrap();
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_round_trip_through_toml() {
    let config = Config::default();
    let text = toml::to_string(&config).unwrap();
    let parsed = ConfigLoader::new()
        .load_from_string(&text, ConfigFormat::Toml)
        .unwrap();
    assert_eq!(parsed, config);
}

#[tokio::test]
async fn test_syntax_error_names_format() {
    let err = ConfigLoader::new()
        .load_from_string("transfer: [unclosed", ConfigFormat::Yaml)
        .unwrap_err();
    assert!(matches!(err, ConfigError::Parse { format: "YAML", .. }));
}
