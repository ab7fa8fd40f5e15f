//! Configuration loading
//!
//! Settings resolve in priority order:
//! 1. Command-line arguments (applied by the binary on top of the loaded config)
//! 2. Environment variable `IMGBEND_CONFIG` naming a TOML file
//! 3. `<config_dir>/imgbend/config.toml`
//! 4. Compiled defaults
//!
//! A missing default config file is not an error; an explicitly named file that
//! cannot be read is.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "IMGBEND_CONFIG";

/// What the engine writes to the outputs when the outbound queue is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnderrunPolicy {
    /// Leave the previous block on the outputs (matches a host that reuses port memory)
    #[default]
    RepeatLast,
    /// Write silence
    Silence,
}

impl std::str::FromStr for UnderrunPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "repeat-last" => Ok(UnderrunPolicy::RepeatLast),
            "silence" => Ok(UnderrunPolicy::Silence),
            other => Err(Error::Config(format!(
                "Unknown underrun policy '{}' (expected 'repeat-last' or 'silence')",
                other
            ))),
        }
    }
}

/// Port wiring settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Connect to devices matching the patterns below instead of the defaults
    pub autoconnect: bool,
    /// Pattern for the ports our outputs feed (the processing loop's inputs)
    pub input_pattern: String,
    /// Pattern for the ports our inputs read (the processing loop's outputs)
    pub output_pattern: String,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            autoconnect: false,
            input_pattern: "cv_in_*".to_string(),
            output_pattern: "cv_out_*".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Bridge configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Audio client name
    pub client_name: String,

    /// Frames per audio callback; fixed for the whole session
    pub block_size: usize,

    /// Outbound queue capacity in blocks
    pub queue_depth: usize,

    /// Inbound queue capacity in blocks
    pub inbound_depth: usize,

    /// Output behavior when the outbound queue is empty
    pub underrun_policy: UnderrunPolicy,

    /// Blocks of delay between output and input in the loopback host
    pub capture_latency_blocks: usize,

    pub connect: ConnectConfig,

    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            client_name: "Img2Jack".to_string(),
            block_size: 1024,
            queue_depth: 64,
            inbound_depth: 1024,
            underrun_policy: UnderrunPolicy::RepeatLast,
            capture_latency_blocks: 4,
            connect: ConnectConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BridgeConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would break chunking or queueing
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be greater than 0".to_string()));
        }
        if self.queue_depth == 0 {
            return Err(Error::Config("queue_depth must be greater than 0".to_string()));
        }
        if self.inbound_depth == 0 {
            return Err(Error::Config("inbound_depth must be greater than 0".to_string()));
        }
        if self.client_name.trim().is_empty() {
            return Err(Error::Config("client_name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("imgbend").join("config.toml"))
}

/// Pick the config file: CLI argument, then environment, then the platform default.
///
/// The boolean is true when the path was requested explicitly.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, bool)> {
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), true));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some((PathBuf::from(path), true));
        }
    }
    default_config_path().map(|p| (p, false))
}

/// Load the bridge configuration following the resolution order above
pub fn load_config(cli_arg: Option<&Path>) -> Result<BridgeConfig> {
    match resolve_config_path(cli_arg) {
        Some((path, true)) => {
            info!("Loading config from {}", path.display());
            BridgeConfig::from_file(&path)
        }
        Some((path, false)) if path.exists() => {
            info!("Loading config from {}", path.display());
            BridgeConfig::from_file(&path)
        }
        Some((path, false)) => {
            warn!("No config file at {}, using defaults", path.display());
            Ok(BridgeConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using defaults");
            Ok(BridgeConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connect.input_pattern, "cv_in_*");
        assert_eq!(config.connect.output_pattern, "cv_out_*");
        assert_eq!(config.underrun_policy, UnderrunPolicy::RepeatLast);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
            block_size = 256
            underrun_policy = "silence"
            [connect]
            autoconnect = true
            "#,
        )
        .unwrap();
        assert_eq!(config.block_size, 256);
        assert_eq!(config.underrun_policy, UnderrunPolicy::Silence);
        assert!(config.connect.autoconnect);
        assert_eq!(config.connect.input_pattern, "cv_in_*");
        assert_eq!(config.client_name, "Img2Jack");
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            BridgeConfig::from_toml_str("block_size = 0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_underrun_policy_from_str() {
        assert_eq!("silence".parse::<UnderrunPolicy>().unwrap(), UnderrunPolicy::Silence);
        assert_eq!("repeat-last".parse::<UnderrunPolicy>().unwrap(), UnderrunPolicy::RepeatLast);
        assert!("zero".parse::<UnderrunPolicy>().is_err());
    }
}
