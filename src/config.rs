//! Configuration management

use crate::decision::heartbeat_window;
use crate::error::{ReporterError, Result};
use crate::keyring::KeySelection;
use crate::quote::PriceExtractor;
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub feeds: Vec<FeedConfig>,
    pub keystore: KeystoreConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// 0-1 error, 2 warn, 3 info, 4 debug, 5+ trace
    #[serde(default = "default_debug_level")]
    pub debug_level: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Name referenced by feed targets
    pub name: String,
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Expected chain ID; checked against the node at startup when set
    pub chain_id: Option<u64>,
    /// Fixed gas limit for transmit calls (estimated when unset)
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    /// Quote source URL
    pub url: String,
    /// How to pull the latest price out of the response body
    #[serde(default)]
    pub price: PriceExtractor,
    /// Aggregator contracts this feed reports to
    pub targets: Vec<FeedTarget>,
    pub decimals: Option<u32>,
    pub deviation_divisor: Option<u64>,
    pub heartbeat_minutes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedTarget {
    pub chain: String,
    pub address: String,
}

impl FeedTarget {
    pub fn contract_address(&self) -> Result<Address> {
        self.address.parse::<Address>().map_err(|e| {
            ReporterError::Config(format!("invalid contract address {:?}: {}", self.address, e))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreConfig {
    /// Encrypted JSON keystore files
    pub paths: Vec<String>,
    #[serde(default)]
    pub selection: KeySelection,
    /// Shared passphrase; prompted for on the terminal when absent
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Fixed-point decimals of the on-chain answer
    pub decimals: u32,
    /// K in `deviation * K >= new_answer` (20 = 5% move)
    pub deviation_divisor: u64,
    /// Maximum feed staleness before a forced update
    pub heartbeat_minutes: u64,
    pub tick_interval_secs: u64,
    pub confirm_interval_secs: u64,
    pub confirm_attempts: u32,
    pub request_timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            decimals: 8,
            deviation_divisor: 20,
            heartbeat_minutes: 60,
            tick_interval_secs: 60,
            confirm_interval_secs: 5,
            confirm_attempts: 10,
            request_timeout_secs: 30,
        }
    }
}

impl PolicyConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn confirm_interval(&self) -> Duration {
        Duration::from_secs(self.confirm_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_debug_level() -> u8 {
    3
}

pub const MAX_DECIMALS: u32 = 18;

impl Config {
    /// Load configuration from file, with `PRICE_REPORTER_*` env overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .to_str()
            .ok_or_else(|| ReporterError::Config(format!("non UTF-8 config path {:?}", path)))?;

        let builder = config::Config::builder().add_source(config::File::with_name(name));
        Self::build(builder)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(document, config::FileFormat::Toml));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix("PRICE_REPORTER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the reporter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            return Err(ReporterError::Config("no feeds configured".to_string()));
        }
        if self.keystore.paths.is_empty() {
            return Err(ReporterError::Config("no keystore paths configured".to_string()));
        }

        let mut chain_names = HashSet::new();
        for chain in &self.chains {
            if !chain_names.insert(chain.name.as_str()) {
                return Err(ReporterError::Config(format!(
                    "duplicate chain name {:?}",
                    chain.name
                )));
            }
        }

        for feed in &self.feeds {
            if feed.targets.is_empty() {
                return Err(ReporterError::Config(format!(
                    "feed {:?} has no targets",
                    feed.name
                )));
            }
            for target in &feed.targets {
                if !chain_names.contains(target.chain.as_str()) {
                    return Err(ReporterError::Config(format!(
                        "feed {:?} targets unknown chain {:?}",
                        feed.name, target.chain
                    )));
                }
                target.contract_address()?;
            }
            check_policy_values(
                &feed.name,
                feed.decimals.unwrap_or(self.policy.decimals),
                feed.deviation_divisor.unwrap_or(self.policy.deviation_divisor),
                feed.heartbeat_minutes.unwrap_or(self.policy.heartbeat_minutes),
            )?;
        }

        if self.policy.confirm_attempts == 0 {
            return Err(ReporterError::Config("confirm_attempts must be > 0".to_string()));
        }
        if self.policy.tick_interval_secs == 0 {
            return Err(ReporterError::Config("tick_interval_secs must be > 0".to_string()));
        }
        if self.policy.request_timeout_secs == 0 {
            return Err(ReporterError::Config("request_timeout_secs must be > 0".to_string()));
        }

        Ok(())
    }

    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.name == name)
    }

    /// Default tracing directive derived from `debug_level`
    pub fn log_directive(&self) -> &'static str {
        match self.debug_level {
            0 | 1 => "error",
            2 => "warn",
            3 => "info",
            4 => "debug",
            _ => "trace",
        }
    }
}

fn check_policy_values(
    feed: &str,
    decimals: u32,
    deviation_divisor: u64,
    heartbeat_minutes: u64,
) -> Result<()> {
    if decimals > MAX_DECIMALS {
        return Err(ReporterError::Config(format!(
            "feed {:?}: decimals must be <= {}",
            feed, MAX_DECIMALS
        )));
    }
    if deviation_divisor == 0 {
        return Err(ReporterError::Config(format!(
            "feed {:?}: deviation_divisor must be > 0",
            feed
        )));
    }
    if heartbeat_window(heartbeat_minutes).is_none() {
        return Err(ReporterError::Config(format!(
            "feed {:?}: heartbeat_minutes {} is out of range",
            feed, heartbeat_minutes
        )));
    }
    Ok(())
}
