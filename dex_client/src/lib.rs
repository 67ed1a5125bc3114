// Token metadata and USD price resolution for BNB Smart Chain tokens

pub mod price_fetching_service;
pub mod price_sources;
pub mod token_metadata_service;

// Re-export configs from config_manager
pub use config_manager::{PriceConfig, RpcConfig};

pub use price_fetching_service::{PriceCache, PriceFetchingService};
pub use price_sources::{
    parse_cryptocompare, parse_dexscreener, parse_geckoterminal, CryptoCompareSource,
    DexScreenerSource, GeckoTerminalSource, PriceError, PriceSource,
};
pub use token_metadata_service::{
    RpcTokenReader, TokenChainReader, TokenMetadataError, TokenMetadataService,
};
