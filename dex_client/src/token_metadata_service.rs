use async_trait::async_trait;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use ledger_core::address::{self, to_hex};
use ledger_core::{LedgerError, TokenMetadata, TokenMetadataProvider, TrackedTokenList, TtlCache};
use reqwest::{Client, Url};
use retry_utils::{DescribeError, ErrorShape};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

ethers::contract::abigen!(
    Erc20Metadata,
    r#"[
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
    ]"#,
);

#[derive(Error, Debug)]
pub enum TokenMetadataError {
    #[error("Invalid RPC URL {url}: {message}")]
    InvalidRpcUrl { url: String, message: String },
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Contract call {call} on {address} failed: {reason}")]
    ContractCall {
        address: String,
        call: &'static str,
        reason: String,
    },
}

impl DescribeError for TokenMetadataError {
    fn detail(&self, shape: ErrorShape) -> Option<String> {
        match (self, shape) {
            (TokenMetadataError::ContractCall { reason, .. }, ErrorShape::NestedReason) => Some(reason.clone()),
            (TokenMetadataError::HttpError(e), ErrorShape::Cause) => Some(e.to_string()),
            (_, ErrorShape::Message) => Some(self.to_string()),
            _ => None,
        }
    }
}

/// Live ERC-20 `symbol()` / `decimals()` reads.
#[async_trait]
pub trait TokenChainReader: Send + Sync {
    async fn read_metadata(&self, token: &Address) -> Result<TokenMetadata, TokenMetadataError>;
}

/// [`TokenChainReader`] over a JSON-RPC endpoint
#[derive(Debug, Clone)]
pub struct RpcTokenReader {
    provider: Arc<Provider<Http>>,
}

impl RpcTokenReader {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, TokenMetadataError> {
        let url = Url::parse(rpc_url).map_err(|e| TokenMetadataError::InvalidRpcUrl {
            url: rpc_url.to_string(),
            message: e.to_string(),
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        let provider = Provider::new(Http::new_with_client(url, client));
        Ok(Self {
            provider: Arc::new(provider),
        })
    }
}

#[async_trait]
impl TokenChainReader for RpcTokenReader {
    async fn read_metadata(&self, token: &Address) -> Result<TokenMetadata, TokenMetadataError> {
        let contract = Erc20Metadata::new(*token, self.provider.clone());
        let symbol_call = contract.symbol();
        let decimals_call = contract.decimals();
        let (symbol, decimals) = tokio::try_join!(
            async {
                symbol_call.call().await.map_err(|e| TokenMetadataError::ContractCall {
                    address: to_hex(token),
                    call: "symbol()",
                    reason: e.to_string(),
                })
            },
            async {
                decimals_call.call().await.map_err(|e| TokenMetadataError::ContractCall {
                    address: to_hex(token),
                    call: "decimals()",
                    reason: e.to_string(),
                })
            }
        )?;
        Ok(TokenMetadata::new(symbol, decimals))
    }
}

/// Resolves token contracts to symbol and decimals.
///
/// Lookup order: native sentinels, well-known quote tokens, the tracked-token
/// list, the cache, then a live contract read whose result is cached.
pub struct TokenMetadataService {
    tracked: Arc<TrackedTokenList>,
    reader: Arc<dyn TokenChainReader>,
    cache: Arc<TtlCache<Address, TokenMetadata>>,
}

impl TokenMetadataService {
    pub fn new(
        tracked: Arc<TrackedTokenList>,
        reader: Arc<dyn TokenChainReader>,
        cache: Arc<TtlCache<Address, TokenMetadata>>,
    ) -> Self {
        Self {
            tracked,
            reader,
            cache,
        }
    }

    /// Metadata answered without any network call, if any.
    pub fn known_metadata(&self, token: &Address) -> Option<TokenMetadata> {
        if address::is_native(token) {
            return Some(TokenMetadata::native());
        }
        if *token == address::usdt() {
            return Some(TokenMetadata::new("USDT", 18));
        }
        if *token == address::usdc() {
            return Some(TokenMetadata::new("USDC", 18));
        }
        if *token == address::wbnb() {
            return Some(TokenMetadata::new("WBNB", 18));
        }
        self.tracked.metadata(token)
    }

    pub async fn get_metadata(&self, token: &Address) -> Result<TokenMetadata, TokenMetadataError> {
        if let Some(metadata) = self.known_metadata(token) {
            return Ok(metadata);
        }

        if let Some(metadata) = self.cache.get_fresh(token) {
            debug!("Token metadata cache hit for: {}", to_hex(token));
            return Ok(metadata);
        }

        debug!("Reading token metadata on chain for: {}", to_hex(token));
        let raw = self.reader.read_metadata(token).await?;
        let metadata = TokenMetadata::new(address::normalize_symbol(token, &raw.symbol), raw.decimals);
        info!("🪙 Resolved {} as {} ({} decimals)", to_hex(token), metadata.symbol, metadata.decimals);

        self.cache.put(*token, metadata.clone());
        Ok(metadata)
    }
}

#[async_trait]
impl TokenMetadataProvider for TokenMetadataService {
    async fn resolve(&self, token: &Address) -> ledger_core::Result<TokenMetadata> {
        self.get_metadata(token).await.map_err(|e| {
            warn!("⚠️ Token metadata unavailable for {}: {}", to_hex(token), e);
            LedgerError::Metadata {
                address: to_hex(token),
                message: retry_utils::describe_error(&e),
            }
        })
    }
}
