use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

use crate::query_planner::PlannerSettings;
use crate::sql_builder::SqlDialect;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Engine configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file, `:memory:` for an in-memory database
    #[validate(length(min = 1, message = "Database path cannot be empty"))]
    pub database_path: String,

    /// Declarative type catalog (YAML)
    pub schema_path: Option<String>,

    pub dialect: SqlDialect,

    /// Per-parent row ceiling for many-relations without pagination or limit
    #[validate(range(
        min = 1,
        max = 10000,
        message = "Max relation rows must be between 1 and 10000"
    ))]
    pub max_relation_rows: u64,

    /// Maximum depth of a requested field tree
    #[validate(range(min = 1, max = 32, message = "Max depth must be between 1 and 32"))]
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            schema_path: None,
            dialect: SqlDialect::SQLite,
            max_relation_rows: 100,
            max_depth: 8,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            database_path: env::var("GRAPHORM_DATABASE").unwrap_or_else(|_| ":memory:".to_string()),
            schema_path: env::var("GRAPHORM_SCHEMA").ok(),
            dialect: parse_env_var("GRAPHORM_DIALECT", "sqlite")?,
            max_relation_rows: parse_env_var("GRAPHORM_MAX_RELATION_ROWS", "100")?,
            max_depth: parse_env_var("GRAPHORM_MAX_DEPTH", "8")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let config = Self {
            database_path: cli.database_path,
            schema_path: cli.schema_path,
            dialect: cli.dialect,
            max_relation_rows: cli.max_relation_rows,
            max_depth: cli.max_depth,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            dialect: self.dialect,
            max_depth: self.max_depth,
            max_relation_rows: self.max_relation_rows,
        }
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub database_path: String,
    pub schema_path: Option<String>,
    pub dialect: SqlDialect,
    pub max_relation_rows: u64,
    pub max_depth: usize,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
