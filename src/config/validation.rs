//! Configuration validation using JSON Schema

use crate::config::ManagerConfig;
use crate::utils::errors::{McpError, McpResult};
use schemars::schema_for;
use serde_json::Value;
use validator::Validate;

/// Validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Configuration validator
pub struct ConfigValidator {
    schema: Value,
}

impl ConfigValidator {
    /// Create a new validator with the generated schema
    pub fn new() -> Self {
        let schema = schema_for!(ManagerConfig);
        Self {
            schema: serde_json::to_value(&schema).unwrap_or_default(),
        }
    }

    /// Get the JSON Schema for the configuration
    pub fn get_schema(&self) -> &Value {
        &self.schema
    }

    /// Export the schema to a JSON string
    pub fn export_schema(&self) -> String {
        serde_json::to_string_pretty(&self.schema).unwrap_or_default()
    }

    /// Validate and fold every problem into one `McpError::Config`
    pub fn ensure_valid(&self, config: &ManagerConfig) -> McpResult<()> {
        self.validate(config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            McpError::Config(joined)
        })
    }

    pub fn validate(&self, config: &ManagerConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(validation_errors) = config.validate() {
            collect_field_errors("", &validation_errors, &mut errors);
        }

        self.validate_retry(config, &mut errors);
        self.validate_batch(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_retry(&self, config: &ManagerConfig, errors: &mut Vec<ValidationError>) {
        if config.retry.max_delay_ms < config.retry.base_delay_ms {
            errors.push(ValidationError {
                path: "retry.max_delay_ms".to_string(),
                message: format!(
                    "must be at least base_delay_ms ({})",
                    config.retry.base_delay_ms
                ),
            });
        }
    }

    fn validate_batch(&self, config: &ManagerConfig, errors: &mut Vec<ValidationError>) {
        if config.batch.max_parallel > config.batch.max_batch_size {
            errors.push(ValidationError {
                path: "batch.max_parallel".to_string(),
                message: format!(
                    "must not exceed max_batch_size ({})",
                    config.batch.max_batch_size
                ),
            });
        }
    }
}

fn collect_field_errors(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut Vec<ValidationError>,
) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    out.push(ValidationError {
                        path: path.clone(),
                        message: error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("failed `{}` check", error.code)),
                    });
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => {
                collect_field_errors(&path, nested, out);
            }
            validator::ValidationErrorsKind::List(items) => {
                for (idx, nested) in items {
                    collect_field_errors(&format!("{}[{}]", path, idx), nested, out);
                }
            }
        }
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
