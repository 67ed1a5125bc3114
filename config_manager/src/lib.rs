use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

static ADDRESS_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^0[xX][0-9a-fA-F]{40}$").ok());

pub const BUY_POLICIES: [&str; 2] = ["tracked_destination", "quote_to_tracked"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Block explorer (Etherscan v2 multichain API)
    pub explorer: ExplorerConfig,

    /// JSON-RPC endpoint used for ERC-20 metadata reads
    pub rpc: RpcConfig,

    /// Price sources and price cache
    pub prices: PriceConfig,

    /// Reconciliation and aggregation settings
    pub ledger: LedgerConfig,

    /// Retry policy shared by every external call
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Explorer API base URL
    pub api_base_url: String,

    /// Explorer API key
    pub api_key: String,

    /// EVM chain id passed as `chainid`
    pub chain_id: u64,

    /// Rows requested per page (`offset`)
    pub page_size: u32,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Extra fetches when the normal and token streams disagree
    pub consistency_refetch_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Spot price by symbol
    pub cryptocompare_api_url: String,

    /// Token price by address
    pub geckoterminal_api_url: String,
    pub geckoterminal_network: String,

    /// Pair price by address
    pub dexscreener_api_url: String,
    pub dexscreener_chain_id: String,

    pub request_timeout_seconds: u64,

    /// Price cache TTL (5 minutes by default)
    pub cache_ttl_seconds: u64,

    /// Upper bound of in-flight price lookups during aggregation
    pub max_concurrent_lookups: usize,

    /// Symbols pinned to exactly 1 USD
    pub stable_symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Aggregator router whose calls are candidate swaps
    pub router_address: String,

    /// Local copy of the tracked-token list
    pub tracked_tokens_path: String,

    /// Remote tracked-token list
    pub tracked_tokens_url: String,

    /// Chain id the remote list is filtered to
    pub tracked_chain_id: String,

    /// Upper bound of in-flight decode + metadata resolutions
    pub decode_concurrency: usize,

    /// Keep zero-value token transfers in the overlay
    pub keep_zero_value_transfers: bool,

    /// One of `tracked_destination`, `quote_to_tracked`
    pub buy_policy: String,

    /// Factor applied to trading volume before computing points
    pub points_volume_multiplier: f64,

    /// How long resolved token metadata stays cached
    pub metadata_cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            explorer: ExplorerConfig {
                api_base_url: "https://api.etherscan.io".to_string(),
                api_key: "".to_string(), // Must be set in .env or config file
                chain_id: 56,
                page_size: 10_000,
                request_timeout_seconds: 30,
                consistency_refetch_attempts: 3,
            },
            rpc: RpcConfig {
                url: "https://bsc-dataseed.bnbchain.org".to_string(),
                request_timeout_seconds: 15,
            },
            prices: PriceConfig {
                cryptocompare_api_url: "https://min-api.cryptocompare.com".to_string(),
                geckoterminal_api_url: "https://api.geckoterminal.com/api/v2".to_string(),
                geckoterminal_network: "bsc".to_string(),
                dexscreener_api_url: "https://api.dexscreener.com".to_string(),
                dexscreener_chain_id: "bsc".to_string(),
                request_timeout_seconds: 15,
                cache_ttl_seconds: 300,
                max_concurrent_lookups: 8,
                stable_symbols: vec!["USDT".to_string(), "USDC".to_string()],
            },
            ledger: LedgerConfig {
                router_address: "0xb300000b72deaeb607a12d5f54773d1c19c7028d".to_string(),
                tracked_tokens_path: "tracked_tokens.json".to_string(),
                tracked_tokens_url:
                    "https://www.binance.com/bapi/defi/v1/public/wallet-direct/buw/wallet/cex/alpha/all/token/list"
                        .to_string(),
                tracked_chain_id: "56".to_string(),
                decode_concurrency: 100,
                keep_zero_value_transfers: false,
                buy_policy: "tracked_destination".to_string(),
                points_volume_multiplier: 2.0,
                metadata_cache_ttl_seconds: 86_400,
            },
            retry: RetrySettings {
                max_attempts: 3,
                delay_ms: 0,
                backoff_multiplier: 1,
            },
        }
    }
}

fn require_url(field: &str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue(format!(
            "{} must be an http(s) URL, got '{}'",
            field, value
        )))
    }
}

fn require_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(ConfigurationError::InvalidValue(format!(
            "{} must be greater than 0",
            field
        )));
    }
    Ok(())
}

/// True for `0x` followed by exactly 40 hex digits.
pub fn is_address_shaped(value: &str) -> bool {
    ADDRESS_RE
        .as_ref()
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

impl ExplorerConfig {
    pub fn validate(&self) -> Result<()> {
        require_url("explorer.api_base_url", &self.api_base_url)?;
        require_positive("explorer.request_timeout_seconds", self.request_timeout_seconds)?;
        require_positive("explorer.page_size", self.page_size as u64)?;
        Ok(())
    }
}

impl PriceConfig {
    pub fn validate(&self) -> Result<()> {
        require_url("prices.cryptocompare_api_url", &self.cryptocompare_api_url)?;
        require_url("prices.geckoterminal_api_url", &self.geckoterminal_api_url)?;
        require_url("prices.dexscreener_api_url", &self.dexscreener_api_url)?;
        require_positive("prices.request_timeout_seconds", self.request_timeout_seconds)?;
        require_positive("prices.cache_ttl_seconds", self.cache_ttl_seconds)?;
        require_positive("prices.max_concurrent_lookups", self.max_concurrent_lookups as u64)?;
        Ok(())
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_address_shaped(&self.router_address) {
            return Err(ConfigurationError::InvalidValue(format!(
                "ledger.router_address is not a 20-byte hex address: '{}'",
                self.router_address
            )));
        }
        require_url("ledger.tracked_tokens_url", &self.tracked_tokens_url)?;
        require_positive("ledger.decode_concurrency", self.decode_concurrency as u64)?;
        if !BUY_POLICIES.contains(&self.buy_policy.as_str()) {
            return Err(ConfigurationError::InvalidValue(format!(
                "ledger.buy_policy must be one of {:?}, got '{}'",
                BUY_POLICIES, self.buy_policy
            )));
        }
        if !(self.points_volume_multiplier >= 0.0) {
            return Err(ConfigurationError::InvalidValue(
                "ledger.points_volume_multiplier must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl SystemConfig {
    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        // LEDGER__EXPLORER__API_KEY=... style overrides
        config_builder = config_builder.add_source(
            Environment::with_prefix("LEDGER")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("prices.stable_symbols"),
        );

        let system_config: SystemConfig = config_builder.build()?.try_deserialize()?;
        system_config.validate()?;

        if system_config.explorer.api_key.is_empty() {
            debug!("Explorer API key is empty; requests will use the anonymous rate limit");
        }

        Ok(system_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.explorer.validate()?;
        require_url("rpc.url", &self.rpc.url)?;
        require_positive("rpc.request_timeout_seconds", self.rpc.request_timeout_seconds)?;
        self.prices.validate()?;
        self.ledger.validate()?;
        Ok(())
    }

    /// Get configuration as a JSON value, with secrets masked
    pub fn to_json_value(&self) -> serde_json::Value {
        let mut masked = self.clone();
        if !masked.explorer.api_key.is_empty() {
            masked.explorer.api_key = "***".to_string();
        }
        serde_json::to_value(&masked).unwrap_or(serde_json::Value::Null)
    }
}
