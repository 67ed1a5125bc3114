use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::address::{self, NATIVE_DECIMALS, NATIVE_SYMBOL, ZERO_ADDRESS};

/// Explorer `txlist` row. Numeric fields arrive as decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalTransaction {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub nonce: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub gas: String,
    pub gas_price: String,
    pub gas_used: String,
    pub input: String,
    pub method_id: String,
    pub function_name: String,
    pub contract_address: String,
    pub is_error: String,
    #[serde(rename = "txreceipt_status")]
    pub txreceipt_status: String,
}

/// Explorer `txlistinternal` row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InternalTransaction {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub contract_address: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub trace_id: String,
    pub is_error: String,
}

/// Explorer `tokentx` row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenTransferTransaction {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub contract_address: String,
    pub value: String,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: String,
}

/// The three explorer streams a reconciliation run consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStream {
    Normal,
    Internal,
    TokenTransfer,
}

impl TransactionStream {
    /// Explorer `action` parameter for this stream
    pub fn action(&self) -> &'static str {
        match self {
            TransactionStream::Normal => "txlist",
            TransactionStream::Internal => "txlistinternal",
            TransactionStream::TokenTransfer => "tokentx",
        }
    }
}

impl std::fmt::Display for TransactionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}

/// One fetched row, tagged by the stream it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTransaction {
    Normal(NormalTransaction),
    Internal(InternalTransaction),
    TokenTransfer(TokenTransferTransaction),
}

/// Inclusive block window for explorer queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRange {
    pub start_block: u64,
    pub end_block: u64,
}

impl BlockRange {
    /// Explorer's "latest" sentinel for `endblock`.
    pub const LATEST: u64 = 99_999_999;

    pub fn new(start_block: u64, end_block: u64) -> Self {
        Self { start_block, end_block }
    }
}

impl Default for BlockRange {
    fn default() -> Self {
        Self {
            start_block: 0,
            end_block: Self::LATEST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
        }
    }

    pub fn native() -> Self {
        Self::new(NATIVE_SYMBOL, NATIVE_DECIMALS)
    }
}

/// One side of a swap. `amount` is already scaled by `decimals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub amount: f64,
}

impl Leg {
    pub fn new(address: Address, metadata: TokenMetadata, amount: f64) -> Self {
        Self {
            address,
            symbol: metadata.symbol,
            decimals: metadata.decimals,
            amount: amount.max(0.0),
        }
    }

    pub fn native(amount: f64) -> Self {
        Self::new(ZERO_ADDRESS, TokenMetadata::native(), amount)
    }

    pub fn is_native(&self) -> bool {
        address::is_native(&self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

impl TxStatus {
    /// Success only when both the call's error flag and the receipt agree.
    pub fn from_explorer(is_error: &str, receipt_status: &str) -> Self {
        if is_error == "0" && receipt_status == "1" {
            TxStatus::Success
        } else {
            TxStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledTransaction {
    pub hash: String,
    pub timestamp: i64,
    pub status: TxStatus,
    pub gas_cost_native: f64,
    pub from: Option<Leg>,
    pub to: Option<Leg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<f64>,
}

impl ReconciledTransaction {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }

    pub fn has_leg(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn from_address(&self) -> Option<&Address> {
        self.from.as_ref().map(|leg| &leg.address)
    }

    pub fn to_address(&self) -> Option<&Address> {
        self.to.as_ref().map(|leg| &leg.address)
    }
}

/// A candidate swap that could not be represented in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTransaction {
    pub hash: String,
    pub timestamp: i64,
    pub reason: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledLedger {
    pub transactions: Vec<ReconciledTransaction>,
    pub skipped: Vec<SkippedTransaction>,
}

/// Per-token flow totals with the resolved USD price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub address: Address,
    pub symbol: String,
    #[serde(rename = "in")]
    pub inflow: f64,
    #[serde(rename = "out")]
    pub outflow: f64,
    pub price: f64,
    pub net_flow: f64,
    #[serde(rename = "profitUSD")]
    pub profit_usd: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsTier {
    pub value: f64,
    pub points: u32,
    pub range: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletMetrics {
    pub trading_volume_usd: f64,
    pub points: PointsTier,
    pub total_profit_usd: String,
}

/// Everything a consumer needs to render one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReport {
    pub address: Address,
    pub block_range: BlockRange,
    pub transactions: Vec<ReconciledTransaction>,
    pub token_summaries: Vec<TokenSummary>,
    pub metrics: WalletMetrics,
    pub skipped: Vec<SkippedTransaction>,
}

/// Entry of the Binance Alpha token list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedToken {
    pub contract_address: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u8,
    #[serde(default)]
    pub chain_id: String,
}
