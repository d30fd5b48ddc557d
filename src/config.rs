//! Configuration management with validation and defaults
//!
//! Layering: network preset (or TOML file) -> `RAFFLE_*` environment
//! overrides -> validation.

use crate::common::types::{parse_ether, Address, Amount, KeyHash, SubscriptionId};
use crate::errors::ConfigurationError;
use crate::lottery::ledger::DEFAULT_MAX_PLAYERS;
use crate::lottery::raffle::RaffleParams;
use crate::oracle::local::{MAX_NUM_WORDS, MAX_REQUEST_CONFIRMATIONS};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Gas lane used by the bundled presets
pub const DEFAULT_KEY_HASH: &str = "0x474e34a077df58807dbe9c96d3c009b23b3c6d0cce433e59bbf5b34f823bc56c";
/// Sepolia VRF coordinator
pub const SEPOLIA_COORDINATOR: &str = "0x8103B0A8A00be2DDC778e6e7eaa21791Cd364625";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RaffleConfig {
    /// Preset name this configuration was derived from
    pub network: String,
    pub raffle: RoundConfig,
    pub oracle: OracleConfig,
    pub keeper: KeeperConfig,
    pub api: ApiSettings,
    pub monitoring: MonitoringConfig,
    /// Balances credited to the bank before the raffle opens
    pub genesis: Vec<GenesisAccount>,
}

impl Default for RaffleConfig {
    fn default() -> Self {
        Self::hardhat()
    }
}

/// Round parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoundConfig {
    /// Entrance fee in ether, e.g. `"0.01"`
    pub entrance_fee: String,
    pub interval_secs: u64,
    pub max_players: usize,
    /// Identity of the raffle; derived from a label when unset
    pub address: Option<Address>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            entrance_fee: "0.01".to_string(),
            interval_secs: 30,
            max_players: DEFAULT_MAX_PLAYERS,
            address: None,
        }
    }
}

impl RoundConfig {
    pub fn entrance_fee_wei(&self) -> Result<Amount, ConfigurationError> {
        parse_ether(&self.entrance_fee).map_err(|e| ConfigurationError::InvalidValue {
            field: "raffle.entrance_fee".to_string(),
            value: self.entrance_fee.clone(),
            reason: e.to_string(),
        })
    }

    pub fn raffle_address(&self) -> Address {
        self.address.unwrap_or_else(|| Address::from_label("raffle"))
    }
}

/// Randomness oracle settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// Coordinator identity; a local coordinator id is derived when unset
    pub coordinator: Option<Address>,
    pub key_hash: KeyHash,
    /// Existing subscription; one is created on the local coordinator when unset
    pub subscription_id: Option<SubscriptionId>,
    /// LINK (in ether units) put on a freshly created subscription
    pub subscription_fund: String,
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
    pub num_words: u32,
    /// Local coordinator flat fee in LINK
    pub base_fee: String,
    /// Local coordinator LINK wei per gas unit
    pub gas_price_link: u64,
    /// Delay before the local coordinator answers a request
    pub fulfillment_delay_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            coordinator: None,
            key_hash: default_key_hash(),
            subscription_id: None,
            subscription_fund: "10".to_string(),
            callback_gas_limit: 500_000,
            request_confirmations: 3,
            num_words: 1,
            base_fee: "0.25".to_string(),
            gas_price_link: 1_000_000_000,
            fulfillment_delay_ms: 1_000,
        }
    }
}

impl OracleConfig {
    pub fn coordinator_id(&self) -> Address {
        self.coordinator
            .unwrap_or_else(|| Address::from_label("local-vrf-coordinator"))
    }

    pub fn base_fee_wei(&self) -> Result<Amount, ConfigurationError> {
        parse_ether(&self.base_fee).map_err(|e| ConfigurationError::InvalidValue {
            field: "oracle.base_fee".to_string(),
            value: self.base_fee.clone(),
            reason: e.to_string(),
        })
    }

    pub fn subscription_fund_wei(&self) -> Result<Amount, ConfigurationError> {
        parse_ether(&self.subscription_fund).map_err(|e| ConfigurationError::InvalidValue {
            field: "oracle.subscription_fund".to_string(),
            value: self.subscription_fund.clone(),
            reason: e.to_string(),
        })
    }

    pub fn fulfillment_delay(&self) -> Duration {
        Duration::from_millis(self.fulfillment_delay_ms)
    }
}

fn default_key_hash() -> KeyHash {
    KeyHash::from_str(DEFAULT_KEY_HASH).unwrap_or_default()
}

/// Pre-funded account, `[[genesis]]` in TOML
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenesisAccount {
    pub address: Address,
    /// Balance in ether, e.g. `"1.5"`
    pub balance: String,
}

impl GenesisAccount {
    pub fn balance_wei(&self) -> Result<Amount, ConfigurationError> {
        parse_ether(&self.balance).map_err(|e| ConfigurationError::InvalidValue {
            field: format!("genesis[{}].balance", self.address),
            value: self.balance.clone(),
            reason: e.to_string(),
        })
    }
}

/// Upkeep automation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeeperConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1_000,
        }
    }
}

impl KeeperConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// HTTP/WebSocket surface
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Expose `POST /faucet` for crediting test accounts
    pub enable_faucet: bool,
    /// Highest balance (ether) the faucet will top an account up to; unlimited when unset
    pub faucet_max_balance: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            request_timeout_secs: 30,
            enable_faucet: true,
            faucet_max_balance: None,
        }
    }
}

impl ApiSettings {
    pub fn faucet_cap_wei(&self) -> Result<Option<Amount>, ConfigurationError> {
        self.faucet_max_balance
            .as_deref()
            .map(|cap| {
                parse_ether(cap).map_err(|e| ConfigurationError::InvalidValue {
                    field: "api.faucet_max_balance".to_string(),
                    value: cap.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub log_level: LogLevel,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_level: LogLevel::Info,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Default `tracing` filter directive for this level
    pub fn filter(&self) -> String {
        let level = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        format!("raffle={},tower_http={}", level, level)
    }
}

impl FromStr for LogLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigurationError::InvalidValue {
                field: "monitoring.log_level".to_string(),
                value: s.to_string(),
                reason: "expected error|warn|info|debug|trace".to_string(),
            }),
        }
    }
}

impl RaffleConfig {
    /// Local development chain: short interval, local coordinator
    pub fn hardhat() -> Self {
        Self {
            network: "hardhat".to_string(),
            raffle: RoundConfig::default(),
            oracle: OracleConfig::default(),
            keeper: KeeperConfig::default(),
            api: ApiSettings::default(),
            monitoring: MonitoringConfig::default(),
            genesis: Vec::new(),
        }
    }

    /// Local node with a pre-created subscription
    pub fn localhost() -> Self {
        let mut config = Self::hardhat();
        config.network = "localhost".to_string();
        config.oracle.subscription_id = Some(588);
        config.oracle.callback_gas_limit = 500_000;
        config
    }

    /// Public testnet parameters. The faucet stays on but only tops accounts
    /// up to a few entries' worth.
    pub fn sepolia() -> Self {
        let mut config = Self::hardhat();
        config.network = "sepolia".to_string();
        config.oracle.coordinator = Address::from_str(SEPOLIA_COORDINATOR).ok();
        config.oracle.subscription_id = Some(8536);
        config.oracle.callback_gas_limit = 5_000_000;
        config.oracle.fulfillment_delay_ms = 15_000;
        config.api.host = "0.0.0.0".to_string();
        config.api.faucet_max_balance = Some("0.1".to_string());
        config
    }

    pub fn for_network(name: &str) -> Result<Self, ConfigurationError> {
        match name {
            "hardhat" => Ok(Self::hardhat()),
            "localhost" => Ok(Self::localhost()),
            "sepolia" => Ok(Self::sepolia()),
            other => Err(ConfigurationError::UnknownNetwork(other.to_string())),
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.raffle.entrance_fee_wei()? == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "raffle.entrance_fee must be greater than 0".to_string(),
            ));
        }
        if self.raffle.interval_secs == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "raffle.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.raffle.max_players == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "raffle.max_players must be greater than 0".to_string(),
            ));
        }
        if self.oracle.num_words == 0 || self.oracle.num_words > MAX_NUM_WORDS {
            return Err(ConfigurationError::ValidationFailed(format!(
                "oracle.num_words must be between 1 and {}",
                MAX_NUM_WORDS
            )));
        }
        if self.oracle.request_confirmations > MAX_REQUEST_CONFIRMATIONS {
            return Err(ConfigurationError::ValidationFailed(format!(
                "oracle.request_confirmations must be at most {}",
                MAX_REQUEST_CONFIRMATIONS
            )));
        }
        if self.oracle.callback_gas_limit == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "oracle.callback_gas_limit must be greater than 0".to_string(),
            ));
        }
        self.oracle.base_fee_wei()?;
        self.oracle.subscription_fund_wei()?;
        if self.keeper.enabled && self.keeper.poll_interval_ms == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "keeper.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.api.enabled && self.api.port == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "api.port must be greater than 0".to_string(),
            ));
        }
        self.api.faucet_cap_wei()?;
        self.genesis_balances()?;
        Ok(())
    }

    /// Genesis allocations in wei, in configuration order
    pub fn genesis_balances(&self) -> Result<Vec<(Address, Amount)>, ConfigurationError> {
        self.genesis
            .iter()
            .map(|account| Ok((account.address, account.balance_wei()?)))
            .collect()
    }

    /// Deployment parameters for the raffle, given the subscription in use
    pub fn raffle_params(&self, subscription_id: SubscriptionId) -> Result<RaffleParams, ConfigurationError> {
        Ok(RaffleParams {
            address: self.raffle.raffle_address(),
            coordinator: self.oracle.coordinator_id(),
            entrance_fee: self.raffle.entrance_fee_wei()?,
            key_hash: self.oracle.key_hash,
            subscription_id,
            callback_gas_limit: self.oracle.callback_gas_limit,
            request_confirmations: self.oracle.request_confirmations,
            num_words: self.oracle.num_words,
            interval: self.raffle.interval_secs,
            max_players: self.raffle.max_players,
        })
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    network: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML file instead of a preset
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Load configuration from file or preset, then the process environment
    pub fn load(&self) -> Result<RaffleConfig, ConfigurationError> {
        self.load_with(|key| env::var(key).ok())
    }

    /// Same as `load` with an explicit variable lookup
    pub fn load_with<F>(&self, lookup: F) -> Result<RaffleConfig, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match (&self.config_path, &self.network) {
            (Some(path), _) => Self::load_from_file(path)?,
            (None, Some(network)) => RaffleConfig::for_network(network)?,
            (None, None) => RaffleConfig::default(),
        };

        apply_overrides(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<RaffleConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }
}

fn parse_var<T: FromStr>(key: &str, value: String) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: key.to_string(),
        value,
        reason: "could not parse".to_string(),
    })
}

/// Apply `RAFFLE_*` overrides
fn apply_overrides<F>(config: &mut RaffleConfig, lookup: F) -> Result<(), ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(fee) = lookup("RAFFLE_ENTRANCE_FEE") {
        config.raffle.entrance_fee = fee;
    }
    if let Some(v) = lookup("RAFFLE_INTERVAL_SECS") {
        config.raffle.interval_secs = parse_var("RAFFLE_INTERVAL_SECS", v)?;
    }
    if let Some(v) = lookup("RAFFLE_MAX_PLAYERS") {
        config.raffle.max_players = parse_var("RAFFLE_MAX_PLAYERS", v)?;
    }
    if let Some(v) = lookup("RAFFLE_SUBSCRIPTION_ID") {
        config.oracle.subscription_id = Some(parse_var("RAFFLE_SUBSCRIPTION_ID", v)?);
    }
    if let Some(v) = lookup("RAFFLE_CALLBACK_GAS_LIMIT") {
        config.oracle.callback_gas_limit = parse_var("RAFFLE_CALLBACK_GAS_LIMIT", v)?;
    }
    if let Some(v) = lookup("RAFFLE_FULFILLMENT_DELAY_MS") {
        config.oracle.fulfillment_delay_ms = parse_var("RAFFLE_FULFILLMENT_DELAY_MS", v)?;
    }
    if let Some(v) = lookup("RAFFLE_KEEPER_ENABLED") {
        config.keeper.enabled = parse_var("RAFFLE_KEEPER_ENABLED", v)?;
    }
    if let Some(v) = lookup("RAFFLE_KEEPER_POLL_MS") {
        config.keeper.poll_interval_ms = parse_var("RAFFLE_KEEPER_POLL_MS", v)?;
    }
    if let Some(host) = lookup("RAFFLE_API_HOST") {
        config.api.host = host;
    }
    if let Some(v) = lookup("RAFFLE_API_PORT") {
        config.api.port = parse_var("RAFFLE_API_PORT", v)?;
    }
    if let Some(v) = lookup("RAFFLE_FAUCET_ENABLED") {
        config.api.enable_faucet = parse_var("RAFFLE_FAUCET_ENABLED", v)?;
    }
    if let Some(cap) = lookup("RAFFLE_FAUCET_MAX_BALANCE") {
        config.api.faucet_max_balance = Some(cap);
    }
    if let Some(v) = lookup("RAFFLE_LOG_LEVEL") {
        config.monitoring.log_level = v.parse()?;
    }
    Ok(())
}
