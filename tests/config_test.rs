//! Configuration loading tests

use mcp_dispatch::config::{ConfigLoader, ConfigValidator, LogFormat, ManagerConfig};
use mcp_dispatch::McpError;
use tempfile::TempDir;

#[test]
fn test_defaults_match_documented_values() {
    let config = ManagerConfig::default();
    assert_eq!(config.queue_max_size, 1000);
    assert_eq!(config.max_concurrent, 5);
    assert_eq!(config.process_interval_ms, 50);
    assert_eq!(config.request_timeout_ms, 30_000);
    assert!(config.enable_priority);
    assert!(config.enable_request_queue);
    assert!(config.enable_tool_registry);
    assert_eq!(config.batch.max_batch_size, 10);
    assert_eq!(config.batch.max_parallel, 3);
    assert!(!config.registry.reenable_on_descriptor_change);
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn test_load_json_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dispatch.json");
    std::fs::write(
        &path,
        r#"{
            "enable_request_queue": false,
            "batch": { "max_batch_size": 20, "max_parallel": 4 },
            "logging": { "level": "debug", "format": "json" }
        }"#,
    )
    .unwrap();

    let config = ConfigLoader::new()
        .with_file(path.to_str().unwrap())
        .without_env()
        .load()
        .unwrap();

    assert!(!config.enable_request_queue);
    assert_eq!(config.batch.max_batch_size, 20);
    assert_eq!(config.batch.max_parallel, 4);
    assert_eq!(config.batch.batch_timeout_ms, 100);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_environment_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dispatch.toml");
    std::fs::write(&path, "max_concurrent = 2\n[retry]\nmax_retries = 7\n").unwrap();

    std::env::set_var("MCP_DISPATCH_MAX_CONCURRENT", "9");
    std::env::set_var("MCP_DISPATCH_RETRY__BASE_DELAY_MS", "250");
    let loaded = ConfigLoader::new().with_file(path.to_str().unwrap()).load();
    std::env::remove_var("MCP_DISPATCH_MAX_CONCURRENT");
    std::env::remove_var("MCP_DISPATCH_RETRY__BASE_DELAY_MS");

    let config = loaded.unwrap();
    assert_eq!(config.max_concurrent, 9);
    assert_eq!(config.retry.max_retries, 7);
    assert_eq!(config.retry.base_delay_ms, 250);
}

#[test]
fn test_semantic_checks_reported_together() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dispatch.toml");
    std::fs::write(
        &path,
        "[retry]\nbase_delay_ms = 5000\nmax_delay_ms = 100\n[batch]\nmax_batch_size = 2\nmax_parallel = 8\n",
    )
    .unwrap();

    let err = ConfigLoader::new()
        .with_file(path.to_str().unwrap())
        .without_env()
        .load()
        .unwrap_err();

    match err {
        McpError::Config(message) => {
            assert!(message.contains("retry.max_delay_ms"));
            assert!(message.contains("batch.max_parallel"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_schema_lists_nested_sections() {
    let schema = ConfigValidator::new().export_schema();
    for key in ["batch", "retry", "registry", "logging", "enable_request_queue"] {
        assert!(schema.contains(key), "schema missing {}", key);
    }
}
