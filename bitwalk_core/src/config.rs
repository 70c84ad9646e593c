use crate::stage::Stage;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid num_bits value {0}; expected one of 1, 2, 4, 8, 16, or 32")]
    InvalidNumBits(u64),
    #[error("failed to parse mutator options: {0}")]
    Parse(String),
}

/// Options blob handed over by a host harness, in its JSON wire form:
/// `{"num_bits": N}`. An absent `num_bits` means a full sweep over all six
/// window sizes.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MutatorOptions {
    #[serde(default)]
    pub num_bits: Option<u64>,
}

impl MutatorOptions {
    /// Parses an options blob. An empty or whitespace-only blob selects the
    /// defaults, matching a harness that passes no options at all.
    pub fn from_json_str(options: &str) -> Result<Self, ConfigError> {
        if options.trim().is_empty() {
            return Ok(MutatorOptions::default());
        }
        serde_json::from_str(options).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolves `num_bits` into a stage restriction. A value outside the six
    /// supported window sizes is a construction error.
    pub fn restriction(&self) -> Result<Option<Stage>, ConfigError> {
        match self.num_bits {
            None => Ok(None),
            Some(bits) => match Stage::from_num_bits(bits) {
                Some(stage) => Ok(Some(stage)),
                None => Err(ConfigError::InvalidNumBits(bits)),
            },
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    pub seed_path: Option<PathBuf>,
    #[serde(default)]
    pub num_bits: Option<u64>,
    #[serde(default)]
    pub max_mutations: Option<u64>,
}

impl DriverConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: DriverConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    pub fn options(&self) -> MutatorOptions {
        MutatorOptions {
            num_bits: self.num_bits,
        }
    }
}
