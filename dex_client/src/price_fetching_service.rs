use async_trait::async_trait;
use config_manager::PriceConfig;
use ethers::types::Address;
use ledger_core::address::{self, to_hex, ZERO_ADDRESS};
use ledger_core::{LedgerError, PriceFetcher, Result as LedgerResult, TtlCache};
use reqwest::Client;
use retry_utils::describe_error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::price_sources::{
    CryptoCompareSource, DexScreenerSource, GeckoTerminalSource, PriceError, PriceSource, Result,
};

/// Price cache shared by everything that resolves prices in one process
pub type PriceCache = TtlCache<Address, f64>;

/// Resolves USD prices through an ordered list of sources with a TTL cache
/// in front. Only successful lookups are cached.
#[derive(Clone)]
pub struct PriceFetchingService {
    sources: Vec<Arc<dyn PriceSource>>,
    cache: Arc<PriceCache>,
    stable_symbols: Vec<String>,
}

impl std::fmt::Debug for PriceFetchingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFetchingService")
            .field("sources", &self.source_names())
            .field("cached", &self.cache.len())
            .field("stable_symbols", &self.stable_symbols)
            .finish()
    }
}

impl PriceFetchingService {
    /// CryptoCompare, then GeckoTerminal, then DexScreener
    pub fn new(config: &PriceConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("alpha-ledger-price-fetcher/1.0")
            .build()
            .map_err(|e| PriceError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let sources: Vec<Arc<dyn PriceSource>> = vec![
            Arc::new(CryptoCompareSource::new(
                http_client.clone(),
                config.cryptocompare_api_url.clone(),
            )),
            Arc::new(GeckoTerminalSource::new(
                http_client.clone(),
                config.geckoterminal_api_url.clone(),
                config.geckoterminal_network.clone(),
            )),
            Arc::new(DexScreenerSource::new(
                http_client,
                config.dexscreener_api_url.clone(),
                config.dexscreener_chain_id.clone(),
            )),
        ];

        let cache = Arc::new(PriceCache::new(Duration::from_secs(config.cache_ttl_seconds)));
        Ok(Self::with_sources(sources, cache, config.stable_symbols.clone()))
    }

    pub fn with_sources(
        sources: Vec<Arc<dyn PriceSource>>,
        cache: Arc<PriceCache>,
        stable_symbols: Vec<String>,
    ) -> Self {
        Self {
            sources,
            cache,
            stable_symbols,
        }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    /// Stablecoins are pinned to 1 USD by configured symbol or by address.
    /// The explorer's `BSC-USD` alias only counts on the USDT contract.
    pub fn is_stable(&self, symbol: &str, token: &Address) -> bool {
        self.stable_symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
            || *token == address::usdt()
            || *token == address::usdc()
    }

    /// USD price of one unit of `symbol`/`token`. Never returns zero: when
    /// every source fails the result is [`PriceError::AllSourcesFailed`].
    pub async fn get_usd_price(&self, symbol: &str, token: &Address) -> Result<f64> {
        if self.is_stable(symbol, token) {
            return Ok(1.0);
        }

        let key = cache_key(token);
        if let Some(price) = self.cache.get_fresh(&key) {
            debug!("Price cache hit for {} ({}): {}", symbol, to_hex(&key), price);
            return Ok(price);
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            match source.fetch_usd_price(symbol, token).await {
                Ok(price) => {
                    info!("💰 {} ({}) = ${} via {}", symbol, to_hex(&key), price, source.name());
                    self.cache.put(key, price);
                    return Ok(price);
                }
                Err(e) => {
                    let reason = describe_error(&e);
                    warn!("⚠️ {} price lookup for {} failed: {}", source.name(), symbol, reason);
                    failures.push(format!("{}: {}", source.name(), reason));
                }
            }
        }

        error!("❌ All price sources failed for {} ({})", symbol, to_hex(token));
        Err(PriceError::AllSourcesFailed {
            symbol: symbol.to_string(),
            address: to_hex(token),
            details: failures.join("; "),
        })
    }
}

/// Both native sentinels share one cache slot.
fn cache_key(token: &Address) -> Address {
    if address::is_native(token) {
        ZERO_ADDRESS
    } else {
        *token
    }
}

#[async_trait]
impl PriceFetcher for PriceFetchingService {
    async fn fetch_price(&self, symbol: &str, address: &Address) -> LedgerResult<f64> {
        self.get_usd_price(symbol, address).await.map_err(|e| match e {
            PriceError::AllSourcesFailed {
                symbol,
                address,
                details,
            } => LedgerError::AllPriceSourcesFailed {
                symbol,
                address,
                details,
            },
            other => LedgerError::AllPriceSourcesFailed {
                symbol: symbol.to_string(),
                address: to_hex(address),
                details: describe_error(&other),
            },
        })
    }
}
