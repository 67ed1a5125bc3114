use crate::{
    error::ExplorerError,
    types::{TrackedTokenListResponse, TrackedTokenSourceConfig},
};
use ledger_core::{TrackedToken, TrackedTokenList};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Client for the Binance Alpha token list
#[derive(Debug, Clone)]
pub struct TrackedTokenClient {
    client: Client,
    config: TrackedTokenSourceConfig,
}

impl TrackedTokenClient {
    pub fn with_config(config: TrackedTokenSourceConfig) -> Result<Self, ExplorerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    /// Download the list, keeping only tokens on the configured chain.
    pub async fn fetch_tracked_tokens(&self) -> Result<Vec<TrackedToken>, ExplorerError> {
        info!("📥 Fetching tracked token list from {}", self.config.url);
        let response = self.client.get(&self.config.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Tracked token list error - Status: {}, Body: {}", status, body);
            return Err(ExplorerError::UpstreamUnavailable {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TrackedTokenListResponse = response.json().await?;
        if !payload.success && payload.data.is_empty() {
            return Err(ExplorerError::ApiError {
                message: format!("token list request failed with code {}", payload.code),
            });
        }

        let tokens = parse_tracked_tokens(payload, &self.config.chain_id);
        info!("✅ {} tracked tokens on chain {}", tokens.len(), self.config.chain_id);
        Ok(tokens)
    }

    /// Fetch the list and write it to `path`, returning what was written.
    pub async fn refresh_to_file<P: AsRef<Path>>(&self, path: P) -> ledger_core::Result<TrackedTokenList> {
        let tokens = self
            .fetch_tracked_tokens()
            .await
            .map_err(|e| ledger_core::LedgerError::TokenList(retry_utils::describe_error(&e)))?;
        let list = TrackedTokenList::new(tokens);
        list.save_to_file(&path)?;
        info!("💾 Saved {} tracked tokens to {}", list.len(), path.as_ref().display());
        Ok(list)
    }
}

/// Entries of `payload` on `chain_id`. Rows that do not parse are skipped.
pub fn parse_tracked_tokens(payload: TrackedTokenListResponse, chain_id: &str) -> Vec<TrackedToken> {
    payload
        .data
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<TrackedToken>(entry) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("⚠️ Skipping unparseable token list entry: {}", e);
                None
            }
        })
        .filter(|token| token.chain_id == chain_id)
        .collect()
}
