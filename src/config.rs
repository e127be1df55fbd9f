//! Engine configuration: sandbox limits and the entry-point contract.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::script_log::DEFAULT_MAX_LOGS_PER_FRAME;

fn default_entry_point() -> String {
    "Main".to_string()
}

fn default_function_keyword() -> bool {
    true
}

fn default_max_operations() -> u64 {
    100_000
}

fn default_depth() -> usize {
    64
}

fn default_max_string_size() -> usize {
    10_000
}

fn default_max_array_size() -> usize {
    1_000
}

fn default_max_map_size() -> usize {
    500
}

fn default_max_logs_per_frame() -> u32 {
    DEFAULT_MAX_LOGS_PER_FRAME
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for the scripting engine behind one script document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Name of the function every script must define.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Accept `function` at the start of a line as an alias for `fn`.
    #[serde(default = "default_function_keyword")]
    pub function_keyword: bool,

    /// Operation budget per compile run and per tick. Guards against infinite loops.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    #[serde(default = "default_depth")]
    pub max_call_levels: usize,

    #[serde(default = "default_depth")]
    pub max_expr_depth: usize,

    #[serde(default = "default_depth")]
    pub max_function_expr_depth: usize,

    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,

    #[serde(default = "default_max_map_size")]
    pub max_map_size: usize,

    #[serde(default = "default_max_logs_per_frame")]
    pub max_logs_per_frame: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entry_point: default_entry_point(),
            function_keyword: default_function_keyword(),
            max_operations: default_max_operations(),
            max_call_levels: default_depth(),
            max_expr_depth: default_depth(),
            max_function_expr_depth: default_depth(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_array_size(),
            max_map_size: default_max_map_size(),
            max_logs_per_frame: default_max_logs_per_frame(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut chars = self.entry_point.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid(format!(
                "entry point {:?} is not a valid function name",
                self.entry_point
            )));
        }
        if self.max_operations == 0 {
            return Err(ConfigError::Invalid(
                "maxOperations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.entry_point, "Main");
        assert!(config.function_keyword);
        assert_eq!(config.max_operations, 100_000);
        assert_eq!(config.max_logs_per_frame, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "maxOperations": 500, "functionKeyword": false }"#).unwrap();
        assert_eq!(config.max_operations, 500);
        assert!(!config.function_keyword);
        assert_eq!(config.entry_point, "Main");
        assert_eq!(config.max_call_levels, 64);
    }

    #[test]
    fn test_rejects_bad_entry_point() {
        let config = EngineConfig {
            entry_point: "1main".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            entry_point: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "entryPoint": "Render", "maxLogsPerFrame": 5 }}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.entry_point, "Render");
        assert_eq!(config.max_logs_per_frame, 5);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
