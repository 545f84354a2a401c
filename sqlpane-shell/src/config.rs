//! Configuration loading for the sqlpane shell.
//!
//! Every field has a default, so a missing file means "use defaults". A file
//! that is named but unreadable or malformed is an error.

use serde::{Deserialize, Serialize};
use sqlpane_core::{EngineConfig, MEMORY_TARGET};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "SQLPANE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    pub engine: EngineConfig,
    /// Target connected at startup.
    pub default_target: String,
    /// Widest a rendered cell may get before it is cut.
    pub page_width: usize,
    /// Used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            default_target: MEMORY_TARGET.to_string(),
            page_width: 40,
            log_filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path after --config")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid engine config: {0}")]
    Engine(#[from] sqlpane_core::ConfigError),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ShellConfig {
    /// Load from `--config <path>`, then `SQLPANE_CONFIG`, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var(CONFIG_ENV).ok();
        Self::load_from(std::env::args().skip(1), env)
    }

    pub fn load_from<I>(args: I, env: Option<String>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let path = match config_path_from_args(args)? {
            Some(path) => Some(path),
            None => env.filter(|value| !value.trim().is_empty()).map(PathBuf::from),
        };
        let config = match path {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ShellConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.default_target.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "default_target",
                reason: "must not be empty".to_string(),
            });
        }
        if self.page_width < 4 {
            return Err(ConfigError::InvalidValue {
                field: "page_width",
                reason: "must be >= 4".to_string(),
            });
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log_filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_args<I>(args: I) -> Result<Option<PathBuf>, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args
                .next()
                .map(|path| Some(PathBuf::from(path)))
                .ok_or(ConfigError::MissingConfigPath);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Ok(Some(PathBuf::from(path)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_path() {
        let config = ShellConfig::load_from(args(&[]), None).unwrap();
        assert_eq!(config, ShellConfig::default());
        assert_eq!(config.default_target, ":memory:");
        assert_eq!(config.engine.batch_size, 500);
    }

    #[test]
    fn test_args_take_precedence_over_env() {
        let file = write_config("page_width = 12\n");
        let path = file.path().display().to_string();
        let config =
            ShellConfig::load_from(args(&["--config", &path]), Some("/nope.toml".to_string()))
                .unwrap();
        assert_eq!(config.page_width, 12);
    }

    #[test]
    fn test_env_path_used() {
        let file = write_config("default_target = \"data.db\"\n[engine]\nbatch_size = 50\n");
        let config =
            ShellConfig::load_from(args(&[]), Some(file.path().display().to_string())).unwrap();
        assert_eq!(config.default_target, "data.db");
        assert_eq!(config.engine.batch_size, 50);
        assert!(config.engine.implicit_transactions);
    }

    #[test]
    fn test_equals_form() {
        let file = write_config("log_filter = \"debug\"\n");
        let flag = format!("--config={}", file.path().display());
        let config = ShellConfig::load_from(args(&[&flag]), None).unwrap();
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_dangling_flag_is_error() {
        let err = ShellConfig::load_from(args(&["--config"]), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConfigPath));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let file = write_config("colour = \"red\"\n");
        let err = ShellConfig::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ShellConfig::from_path(Path::new("/definitely/missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validation() {
        let file = write_config("[engine]\nbatch_size = 0\n");
        let path = file.path().display().to_string();
        let err = ShellConfig::load_from(args(&["--config", &path]), None).unwrap_err();
        assert!(matches!(err, ConfigError::Engine(_)));

        let config = ShellConfig {
            page_width: 2,
            ..ShellConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "page_width",
                ..
            })
        ));
    }
}
