use crate::{
    error::ExplorerError,
    types::{ExplorerClientConfig, ExplorerResponse},
};
use async_trait::async_trait;
use ethers::types::Address;
use ledger_core::{
    address::to_hex, BlockRange, InternalTransaction, NormalTransaction, RawTransaction,
    TokenTransferTransaction, TransactionSource, TransactionStream,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Etherscan v2 multichain API client
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: Client,
    config: ExplorerClientConfig,
}

impl ExplorerClient {
    /// Create a new explorer client with custom configuration
    pub fn with_config(config: ExplorerClientConfig) -> Result<Self, ExplorerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, config })
    }

    /// `txlist` rows for `address` within `range`, newest first
    pub async fn get_normal_transactions(
        &self,
        address: &Address,
        range: BlockRange,
    ) -> Result<Vec<NormalTransaction>, ExplorerError> {
        let response = self.fetch_account_stream(TransactionStream::Normal, address, range).await?;
        parse_rows(response, TransactionStream::Normal)
    }

    /// `txlistinternal` rows for `address` within `range`
    pub async fn get_internal_transactions(
        &self,
        address: &Address,
        range: BlockRange,
    ) -> Result<Vec<InternalTransaction>, ExplorerError> {
        let response = self.fetch_account_stream(TransactionStream::Internal, address, range).await?;
        parse_rows(response, TransactionStream::Internal)
    }

    /// `tokentx` rows for `address` within `range`
    pub async fn get_token_transfers(
        &self,
        address: &Address,
        range: BlockRange,
    ) -> Result<Vec<TokenTransferTransaction>, ExplorerError> {
        let response = self
            .fetch_account_stream(TransactionStream::TokenTransfer, address, range)
            .await?;
        parse_rows(response, TransactionStream::TokenTransfer)
    }

    /// Last block mined at or before `timestamp` (unix seconds).
    pub async fn get_block_number_by_timestamp(&self, timestamp: i64) -> Result<u64, ExplorerError> {
        let params = vec![
            ("module", "block".to_string()),
            ("action", "getblocknobytime".to_string()),
            ("timestamp", timestamp.to_string()),
            ("closest", "before".to_string()),
        ];
        let response = self.get(&params).await?;
        let block = parse_block_number(&response);
        info!("📦 Block at or before {}: {}", timestamp, block);
        Ok(block)
    }

    async fn fetch_account_stream(
        &self,
        stream: TransactionStream,
        address: &Address,
        range: BlockRange,
    ) -> Result<ExplorerResponse, ExplorerError> {
        let params = vec![
            ("module", "account".to_string()),
            ("action", stream.action().to_string()),
            ("address", to_hex(address)),
            ("startblock", range.start_block.to_string()),
            ("endblock", range.end_block.to_string()),
            ("page", "1".to_string()),
            ("offset", self.config.page_size.to_string()),
            ("sort", "desc".to_string()),
        ];
        debug!("🔍 Explorer {} for {} (blocks {}..{})", stream, to_hex(address), range.start_block, range.end_block);
        self.get(&params).await
    }

    async fn get(&self, params: &[(&str, String)]) -> Result<ExplorerResponse, ExplorerError> {
        let url = format!("{}/v2/api", self.config.base_url);
        let start_time = std::time::Instant::now();

        let response = self
            .client
            .get(&url)
            .query(&[("chainid", self.config.chain_id.to_string())])
            .query(params)
            .query(&[("apikey", self.config.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        debug!("📨 Explorer responded {} in {:.2}s", status, start_time.elapsed().as_secs_f64());

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("❌ Explorer API error - Status: {}, Body: {}", status, text);

            return Err(match status.as_u16() {
                401 | 403 => ExplorerError::AuthError,
                429 => ExplorerError::RateLimit,
                code => ExplorerError::UpstreamUnavailable { status: code, body: text },
            });
        }

        let response_text = response.text().await?;
        let parsed: ExplorerResponse = serde_json::from_str(&response_text).map_err(|e| {
            let sample_size = response_text.len().min(500);
            error!(
                "❌ Failed to parse explorer response: {} (first {} chars: {})",
                e,
                sample_size,
                response_text.chars().take(sample_size).collect::<String>()
            );
            e
        })?;
        Ok(parsed)
    }
}

/// Rows of a stream response. A non-array `result` is an empty stream.
pub fn parse_rows<T: DeserializeOwned>(
    response: ExplorerResponse,
    stream: TransactionStream,
) -> Result<Vec<T>, ExplorerError> {
    match response.result {
        serde_json::Value::Array(_) => {
            let rows: Vec<T> = serde_json::from_value(response.result)?;
            debug!("✅ {} returned {} rows", stream, rows.len());
            Ok(rows)
        }
        other => {
            let notice = other.as_str().unwrap_or_default();
            if response.message.starts_with("No transactions") || notice.starts_with("No transactions") {
                debug!("{} is empty", stream);
            } else {
                warn!(
                    "⚠️ {} returned no rows: {} {}",
                    stream, response.message, notice
                );
            }
            Ok(Vec::new())
        }
    }
}

/// `getblocknobytime` result, or the "latest" sentinel when it is not a number.
pub fn parse_block_number(response: &ExplorerResponse) -> u64 {
    let parsed = match &response.result {
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        warn!("⚠️ Non-numeric block lookup result: {}", response.result);
        BlockRange::LATEST
    })
}

#[async_trait]
impl TransactionSource for ExplorerClient {
    async fn fetch_stream(
        &self,
        stream: TransactionStream,
        address: &Address,
        range: BlockRange,
    ) -> ledger_core::Result<Vec<RawTransaction>> {
        let rows = match stream {
            TransactionStream::Normal => self
                .get_normal_transactions(address, range)
                .await
                .map(|rows| rows.into_iter().map(RawTransaction::Normal).collect()),
            TransactionStream::Internal => self
                .get_internal_transactions(address, range)
                .await
                .map(|rows| rows.into_iter().map(RawTransaction::Internal).collect()),
            TransactionStream::TokenTransfer => self
                .get_token_transfers(address, range)
                .await
                .map(|rows| rows.into_iter().map(RawTransaction::TokenTransfer).collect()),
        };
        rows.map_err(|e| e.into_ledger_error(stream))
    }
}
