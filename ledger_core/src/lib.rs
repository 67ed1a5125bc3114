pub mod address;
pub mod cache;
pub mod portfolio;
pub mod tracked;
pub mod types;
pub mod units;

pub use cache::{CacheEntry, TtlCache};
pub use portfolio::{
    accumulate_flows, bucket_key, calculate_points, filter_transactions, format_usd, is_buy, is_sell,
    profit_usd, total_profit_usd, trading_volume, BuyPolicy, TokenFlow, TransactionView,
};
pub use tracked::TrackedTokenList;
pub use types::*;

use async_trait::async_trait;
use ethers::types::Address;
use retry_utils::{DescribeError, ErrorShape};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Malformed address: {0}")]
    MalformedAddress(String),
    #[error("Upstream {stream} unavailable: {message}")]
    UpstreamUnavailable {
        stream: TransactionStream,
        message: String,
    },
    #[error("Upstream {stream} rejected the request: {message}")]
    UpstreamRejected {
        stream: TransactionStream,
        message: String,
    },
    #[error("Token metadata unavailable for {address}: {message}")]
    Metadata { address: String, message: String },
    #[error("All price sources failed for {symbol} ({address}): {details}")]
    AllPriceSourcesFailed {
        symbol: String,
        address: String,
        details: String,
    },
    #[error("Tracked token list error: {0}")]
    TokenList(String),
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Json(err.to_string())
    }
}

impl LedgerError {
    /// Transient failures are worth another attempt. Rejected credentials and
    /// malformed input fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::UpstreamUnavailable { .. }
                | LedgerError::Metadata { .. }
                | LedgerError::AllPriceSourcesFailed { .. }
        )
    }
}

impl DescribeError for LedgerError {
    fn detail(&self, shape: ErrorShape) -> Option<String> {
        match (self, shape) {
            (LedgerError::UpstreamUnavailable { message, .. }, ErrorShape::Cause) => Some(message.clone()),
            (LedgerError::UpstreamRejected { message, .. }, ErrorShape::Cause) => Some(message.clone()),
            (LedgerError::Metadata { message, .. }, ErrorShape::Reason) => Some(message.clone()),
            (LedgerError::AllPriceSourcesFailed { details, .. }, ErrorShape::Reason) => Some(details.clone()),
            (_, ErrorShape::Message) => Some(self.to_string()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Block-explorer style source of the three raw transaction streams.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Fetch one stream for `address`. A missing or non-array result is an
    /// empty stream, not an error.
    async fn fetch_stream(
        &self,
        stream: TransactionStream,
        address: &Address,
        range: BlockRange,
    ) -> Result<Vec<RawTransaction>>;
}

/// Resolves a token contract to its symbol and decimals.
#[async_trait]
pub trait TokenMetadataProvider: Send + Sync {
    async fn resolve(&self, address: &Address) -> Result<TokenMetadata>;
}

/// Resolves a token to a USD price. Failure is a hard error, never zero.
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    async fn fetch_price(&self, symbol: &str, address: &Address) -> Result<f64>;
}
