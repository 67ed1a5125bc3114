use config_manager::SystemConfig;
use ethers::types::Address;
use ledger_core::{
    address::parse_address, BuyPolicy, PriceFetcher, TokenMetadataProvider, TrackedTokenList,
    TransactionSource,
};
use retry_utils::{describe_error, DescribeError, ErrorShape, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use swap_decoder::SwapDecoder;
use thiserror::Error;

pub mod aggregator;
pub mod reconciler;

#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::LedgerError),
    #[error("Decode error: {0}")]
    Decode(#[from] swap_decoder::DecodeError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid wallet address: {0}")]
    InvalidWallet(String),
}

impl From<config_manager::ConfigurationError> for OrchestratorError {
    fn from(err: config_manager::ConfigurationError) -> Self {
        OrchestratorError::Config(err.to_string())
    }
}

impl OrchestratorError {
    /// Call data decodes the same way every time, so decode failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl DescribeError for OrchestratorError {
    fn detail(&self, shape: ErrorShape) -> Option<String> {
        match (self, shape) {
            (OrchestratorError::Ledger(e), ErrorShape::Cause) => Some(describe_error(e)),
            (OrchestratorError::Decode(e), ErrorShape::Cause) => Some(describe_error(e)),
            (_, ErrorShape::Message) => Some(self.to_string()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

pub fn parse_wallet(input: &str) -> Result<Address> {
    parse_address(input).map_err(|_| OrchestratorError::InvalidWallet(input.to_string()))
}

/// Knobs for one orchestrator, usually derived from [`SystemConfig`].
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub router: Address,
    pub decode_concurrency: usize,
    pub price_concurrency: usize,
    pub keep_zero_value_transfers: bool,
    pub consistency_refetch_attempts: u32,
    pub buy_policy: BuyPolicy,
    pub points_volume_multiplier: f64,
    pub retry: RetryConfig,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            router: parse_address(swap_decoder::ROUTER_ADDRESS).unwrap_or_default(),
            decode_concurrency: 100,
            price_concurrency: 8,
            keep_zero_value_transfers: false,
            consistency_refetch_attempts: 3,
            buy_policy: BuyPolicy::default(),
            points_volume_multiplier: 2.0,
            retry: RetryConfig::default(),
        }
    }
}

impl LedgerSettings {
    pub fn from_config(config: &SystemConfig) -> Result<Self> {
        let router = parse_address(&config.ledger.router_address)
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;
        let buy_policy = config
            .ledger
            .buy_policy
            .parse::<BuyPolicy>()
            .map_err(OrchestratorError::Config)?;

        Ok(Self {
            router,
            decode_concurrency: config.ledger.decode_concurrency.max(1),
            price_concurrency: config.prices.max_concurrent_lookups.max(1),
            keep_zero_value_transfers: config.ledger.keep_zero_value_transfers,
            consistency_refetch_attempts: config.explorer.consistency_refetch_attempts,
            buy_policy,
            points_volume_multiplier: config.ledger.points_volume_multiplier,
            retry: RetryConfig {
                max_attempts: config.retry.max_attempts,
                delay: Duration::from_millis(config.retry.delay_ms),
                backoff_multiplier: config.retry.backoff_multiplier,
            },
        })
    }
}

/// Turns a wallet's raw explorer activity into a reconciled, priced ledger.
///
/// Every collaborator is injected, so the same orchestrator runs against the
/// live explorer/RPC/price clients or against in-memory fakes.
pub struct LedgerOrchestrator {
    source: Arc<dyn TransactionSource>,
    metadata: Arc<dyn TokenMetadataProvider>,
    prices: Arc<dyn PriceFetcher>,
    tracked: Arc<TrackedTokenList>,
    decoder: SwapDecoder,
    settings: LedgerSettings,
}

impl LedgerOrchestrator {
    pub fn new(
        source: Arc<dyn TransactionSource>,
        metadata: Arc<dyn TokenMetadataProvider>,
        prices: Arc<dyn PriceFetcher>,
        tracked: Arc<TrackedTokenList>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            source,
            metadata,
            prices,
            tracked,
            decoder: SwapDecoder::builtin().clone(),
            settings,
        }
    }
}
