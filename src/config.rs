//! Configuration file handling
//!
//! A single TOML file can tune the controller, the flash emulator and the
//! bench. Every table and key is optional:
//!
//! ```toml
//! [controller]
//! ack_id = "mem"
//! handshake_timeout_cycles = 10000
//! erase_opcode = "C7"
//!
//! [flash]
//! initial_qe = false
//! erase_cycles = 2000
//!
//! [bench]
//! seed = 42
//! grant_latency = 2
//! ```

use qspimem_bench::BenchConfig;
use qspimem_core::ControllerConfig;
use qspimem_dummy::DummyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors loading or writing the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },
    /// File is not valid TOML for [`AppConfig`]
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// Configuration could not be serialized
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Everything the CLI can configure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Controller tunables
    pub controller: ControllerConfig,
    /// Flash emulator
    pub flash: DummyConfig,
    /// Host and ack bus models
    pub bench: BenchConfig,
}

impl AppConfig {
    /// Load from `path`, or return the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                let config = Self::from_toml_str(&content)?;
                log::info!("Loaded configuration from {:?}", path);
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qspimem_core::{AccelId, EraseOpcode};

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(AppConfig::from_toml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_tables() {
        let config = AppConfig::from_toml_str(
            r#"
            [controller]
            ack_id = "aes"
            erase_opcode = "60"

            [flash]
            initial_qe = true

            [bench]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.ack_id, AccelId::Aes);
        assert_eq!(config.controller.erase_opcode, EraseOpcode::X60);
        assert_eq!(config.controller.max_status_polls, 65_536);
        assert!(config.flash.initial_qe);
        assert_eq!(config.flash.page_size, 256);
        assert_eq!(config.bench.seed, 7);
    }

    #[test]
    fn test_unknown_erase_opcode_rejected() {
        let err = AppConfig::from_toml_str("[controller]\nerase_opcode = \"D8\"\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_written_config_reloads() {
        let mut config = AppConfig::default();
        config.bench.grant_latency = 9;
        let text = config.to_toml_string().unwrap();
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), config);
    }
}
