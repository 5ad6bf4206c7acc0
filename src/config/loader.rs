use crate::config::{ConfigValidator, ManagerConfig};
use crate::utils::errors::{McpError, McpResult};
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "MCP_DISPATCH_";

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Detect format from file extension, defaulting to TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            Some("yml") | Some("yaml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Layers defaults, an optional config file and `MCP_DISPATCH_*` variables
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    use_env: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            path: None,
            use_env: true,
        }
    }

    /// Read the given file; `~` is expanded
    pub fn with_file(mut self, path: impl AsRef<str>) -> Self {
        let expanded = shellexpand::tilde(path.as_ref()).to_string();
        self.path = Some(PathBuf::from(expanded));
        self
    }

    /// Skip environment overrides (used by tests)
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    fn figment(&self) -> McpResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(ManagerConfig::default()));

        if let Some(path) = &self.path {
            if !path.exists() {
                return Err(McpError::Config(format!(
                    "configuration file does not exist: {}",
                    path.display()
                )));
            }

            let format = ConfigFormat::from_path(path);
            debug!("Loading {:?} config from {}", format, path.display());
            figment = match format {
                ConfigFormat::Toml => figment.merge(Toml::file(path)),
                ConfigFormat::Json => figment.merge(Json::file(path)),
                ConfigFormat::Yaml => figment.merge(Yaml::file(path)),
            };
        }

        if self.use_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    /// Extract and validate the effective configuration
    pub fn load(&self) -> McpResult<ManagerConfig> {
        let config: ManagerConfig = self
            .figment()?
            .extract()
            .map_err(|e| McpError::Config(format!("Failed to load config: {}", e)))?;

        ConfigValidator::new().ensure_valid(&config)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_format_detection() {
        let cases = vec![
            ("config.toml", ConfigFormat::Toml),
            ("config.json", ConfigFormat::Json),
            ("config.yaml", ConfigFormat::Yaml),
            ("config.yml", ConfigFormat::Yaml),
            ("config", ConfigFormat::Toml),
        ];
        for (path, expected) in cases {
            assert_eq!(
                ConfigFormat::from_path(Path::new(path)),
                expected,
                "Failed for: {}",
                path
            );
        }
    }

    #[test]
    fn test_load_defaults_without_file() {
        let config = ConfigLoader::new().without_env().load().unwrap();
        assert_eq!(config.max_concurrent, 5);
    }

    #[test]
    fn test_load_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dispatch.toml");
        std::fs::write(
            &path,
            "max_concurrent = 8\nenable_priority = false\n[retry]\nmax_retries = 1\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(path.to_str().unwrap())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.max_concurrent, 8);
        assert!(!config.enable_priority);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay_ms, 1000);
    }

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dispatch.yaml");
        std::fs::write(&path, "queue_max_size: 12\nbatch:\n  max_batch_size: 4\n").unwrap();

        let config = ConfigLoader::new()
            .with_file(path.to_str().unwrap())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.queue_max_size, 12);
        assert_eq!(config.batch.max_batch_size, 4);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = ConfigLoader::new()
            .with_file("/nonexistent/dispatch.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(McpError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dispatch.json");
        std::fs::write(&path, r#"{"max_concurrent": 0}"#).unwrap();

        let result = ConfigLoader::new()
            .with_file(path.to_str().unwrap())
            .without_env()
            .load();
        assert!(matches!(result, Err(McpError::Config(_))));
    }
}
