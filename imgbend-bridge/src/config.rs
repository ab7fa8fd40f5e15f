//! Run settings for one bridge session
//!
//! Settings sources priority:
//! 1. Command-line arguments ([`Overrides`])
//! 2. Environment variable `IMGBEND_CONFIG` naming a TOML file
//! 3. `<config_dir>/imgbend/config.toml`
//! 4. Built-in defaults
//!
//! Tiers 2-4 are resolved by [`imgbend_common::config::load_config`]; this
//! module lays the command line on top.

use crate::error::{Error, Result};
use imgbend_common::config::{load_config, BridgeConfig, UnderrunPolicy};
use imgbend_common::ChannelLayout;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sample rate the loopback host is paced at
pub const LOOPBACK_SAMPLE_RATE: u32 = 48_000;

/// Which audio host drives the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Backend {
    /// cpal input and output devices
    #[default]
    Device,
    /// Named JACK client; the server's buffer size sets the block size
    Jack,
    /// In-process loopback, no audio server needed
    Loopback,
}

impl Backend {
    /// JACK when built with it, cpal devices otherwise
    pub fn preferred() -> Self {
        if cfg!(feature = "jack") {
            Backend::Jack
        } else {
            Backend::Device
        }
    }
}

/// Values given on the command line. `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub client_name: Option<String>,
    pub autoconnect: bool,
    pub input_pattern: Option<String>,
    pub output_pattern: Option<String>,
    pub block_size: Option<usize>,
    pub underrun_policy: Option<UnderrunPolicy>,
}

/// Everything a session needs
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub layout: ChannelLayout,
    pub backend: Backend,
    pub config: BridgeConfig,
}

impl Settings {
    /// Settings with built-in defaults and the device backend
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            layout: ChannelLayout::Interleaved,
            backend: Backend::Device,
            config: BridgeConfig::default(),
        }
    }

    /// Load the config file tiers and apply the command line on top
    pub fn load(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        config_path: Option<&Path>,
        overrides: Overrides,
    ) -> Result<Self> {
        let config = load_config(config_path)?;
        let mut settings = Self::new(input, output);
        settings.config = config;
        settings.apply(overrides)?;
        Ok(settings)
    }

    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Apply command-line overrides and re-validate
    pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
        let config = &mut self.config;
        if let Some(name) = overrides.client_name {
            config.client_name = name;
        }
        if overrides.autoconnect {
            config.connect.autoconnect = true;
        }
        if let Some(pattern) = overrides.input_pattern {
            config.connect.input_pattern = pattern;
        }
        if let Some(pattern) = overrides.output_pattern {
            config.connect.output_pattern = pattern;
        }
        if let Some(block_size) = overrides.block_size {
            config.block_size = block_size;
        }
        if let Some(policy) = overrides.underrun_policy {
            config.underrun_policy = policy;
        }

        config
            .validate()
            .map_err(|e| Error::Config(format!("Invalid settings: {}", e)))?;
        debug!("Effective settings: {:?}", self);
        Ok(())
    }
}
