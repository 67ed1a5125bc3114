use serde::{Deserialize, Serialize};

/// Explorer API client configuration
#[derive(Debug, Clone)]
pub struct ExplorerClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub chain_id: u64,
    pub page_size: u32,
    pub timeout_seconds: u64,
}

impl Default for ExplorerClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.etherscan.io".to_string(),
            api_key: String::new(),
            chain_id: 56,
            page_size: 10_000,
            timeout_seconds: 30,
        }
    }
}

impl From<&config_manager::ExplorerConfig> for ExplorerClientConfig {
    fn from(config: &config_manager::ExplorerConfig) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chain_id: config.chain_id,
            page_size: config.page_size,
            timeout_seconds: config.request_timeout_seconds,
        }
    }
}

/// Envelope of every `/v2/api` response. `result` is an array of rows on
/// success and a plain string ("No transactions found", rate-limit notices)
/// otherwise.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExplorerResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Binance Alpha token list configuration
#[derive(Debug, Clone)]
pub struct TrackedTokenSourceConfig {
    pub url: String,
    pub chain_id: String,
    pub timeout_seconds: u64,
}

impl From<&config_manager::SystemConfig> for TrackedTokenSourceConfig {
    fn from(config: &config_manager::SystemConfig) -> Self {
        Self {
            url: config.ledger.tracked_tokens_url.clone(),
            chain_id: config.ledger.tracked_chain_id.clone(),
            timeout_seconds: config.explorer.request_timeout_seconds,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackedTokenListResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub success: bool,
    /// Entries are parsed one by one so a single odd row does not drop the list
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}
