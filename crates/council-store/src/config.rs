//! Process configuration
//!
//! The roster and state directory are fixed at process configuration time;
//! the store never changes them at runtime.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::MemberAddress;

/// Error loading or decoding the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub state: StateConfig,
    pub council: CouncilConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Where durable state lives.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Root directory for poll areas and member control records.
    pub directory: PathBuf,
}

/// The council roster.
#[derive(Debug, Clone, Deserialize)]
pub struct CouncilConfig {
    pub members: Vec<MemberInfo>,
}

/// One authorized voter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemberInfo {
    /// Chat address, the identity votes are recorded under.
    pub address: MemberAddress,
    /// Short handle, used for display and for the control record filename.
    pub nick: String,
    /// Optional long display name.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Periodic expiration sweep settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between expiration sweeps.
    #[serde(default = "default_expire_interval_secs")]
    pub expire_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expire_interval_secs: default_expire_interval_secs(),
        }
    }
}

fn default_expire_interval_secs() -> u64 {
    3600
}

impl Config {
    /// Load and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
