//! Network selection, consensus parameters and the node config file

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::MAX_MONEY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unable to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),
    #[error("invalid devnet PoS target spacing '{0}': expected a positive integer")]
    InvalidPosTargetSpacing(String),
    #[error("PoS target spacing can only be overridden on devnet, not {0}")]
    NotDevnet(Network),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
    Devnet,
    Regtest,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Devnet => "devnet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            "devnet" => Ok(Network::Devnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Largest PoS target spacing a devnet override may set
pub const MAX_POS_TARGET_SPACING: u64 = u64::MAX / 20;

/// Per-network consensus rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusParams {
    pub network: Network,
    pub pow_limit: U256,
    pub pos_limit: U256,
    pub pow_target_spacing: u64,
    pub pos_target_spacing: u64,
    pub pow_target_timespan: u64,
    pub pos_target_timespan: u64,
    pub pow_no_retargeting: bool,
    /// Last height that may be mined; every later block is staked
    pub last_pow_block: u64,
    pub stake_min_value: u64,
    pub stake_max_value: u64,
    /// Seconds
    pub stake_min_age: u64,
    /// Seconds
    pub stake_max_age: u64,
    pub stake_min_confirmations: u64,
    pub default_port: u16,
    pub genesis_time: u64,
    pub genesis_bits: u32,
}

impl ConsensusParams {
    pub fn for_network(network: Network) -> Self {
        let mut params = Self {
            network,
            pow_limit: U256::MAX >> 16,
            pos_limit: U256::MAX >> 32,
            pow_target_spacing: 150,
            pos_target_spacing: 150,
            pow_target_timespan: 24 * 60 * 60,
            pos_target_timespan: 24 * 60 * 60,
            pow_no_retargeting: false,
            last_pow_block: 1000,
            stake_min_value: 0,
            stake_max_value: MAX_MONEY,
            stake_min_age: 10 * 60,
            stake_max_age: 30 * 24 * 60 * 60,
            stake_min_confirmations: 1,
            default_port: 9999,
            genesis_time: 1659283200,
            genesis_bits: 0x1f00ffff,
        };

        match network {
            Network::Main => {
                params.stake_min_confirmations = 15;
            }
            Network::Test => {
                params.default_port = 19999;
                params.genesis_time = 1659283201;
            }
            Network::Devnet => {
                params.default_port = 19799;
                params.genesis_time = 1659283202;
            }
            Network::Regtest => {
                params.pow_limit = U256::MAX >> 1;
                params.pow_no_retargeting = true;
                params.default_port = 19899;
                params.genesis_time = 1659283202;
                params.genesis_bits = 0x207fffff;
            }
        }
        params
    }

    /// Apply a devnet PoS target spacing override given as raw text
    pub fn update_devnet_pos_target_spacing(&mut self, raw: &str) -> Result<(), ConfigError> {
        if self.network != Network::Devnet {
            return Err(ConfigError::NotDevnet(self.network));
        }
        let spacing = raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|spacing| (1..=MAX_POS_TARGET_SPACING).contains(spacing))
            .ok_or_else(|| ConfigError::InvalidPosTargetSpacing(raw.to_string()))?;
        self.pos_target_spacing = spacing;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevnetConfig {
    /// Kept as text so a bad value can be reported rather than rejected by the parser
    #[serde(default)]
    pub pos_target_spacing: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: Network,
    pub data_dir: PathBuf,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub staking: bool,
    /// How far past the tip the staker scans for a kernel
    #[serde(default = "default_stake_search_window")]
    pub stake_search_window_secs: u64,
    #[serde(default)]
    pub devnet: Option<DevnetConfig>,
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_stake_search_window() -> u64 {
    60
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Consensus parameters for the configured network, overrides applied
    pub fn consensus_params(&self) -> Result<ConsensusParams, ConfigError> {
        let mut params = ConsensusParams::for_network(self.network);
        if let Some(raw) = self.devnet.as_ref().and_then(|d| d.pos_target_spacing.as_deref()) {
            params.update_devnet_pos_target_spacing(raw)?;
        }
        Ok(params)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: Network::Main,
            data_dir: PathBuf::from("./data"),
            log_filter: default_log_filter(),
            staking: false,
            stake_search_window_secs: default_stake_search_window(),
            devnet: None,
        }
    }
}
