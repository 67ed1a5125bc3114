use async_trait::async_trait;
use ethers::types::Address;
use ledger_core::address::{self, to_hex, NATIVE_SYMBOL};
use reqwest::Client;
use retry_utils::{DescribeError, ErrorShape};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("{source_name} returned HTTP {status}: {body}")]
    Status {
        source_name: &'static str,
        status: u16,
        body: String,
    },
    #[error("{source_name} error: {message}")]
    ApiError {
        source_name: &'static str,
        message: String,
    },
    #[error("{source_name} has no price for {token}")]
    NotFound {
        source_name: &'static str,
        token: String,
    },
    #[error("{source_name} returned an unusable price {value}")]
    InvalidPrice { source_name: &'static str, value: String },
    #[error("All price sources failed for {symbol} ({address}): {details}")]
    AllSourcesFailed {
        symbol: String,
        address: String,
        details: String,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DescribeError for PriceError {
    fn detail(&self, shape: ErrorShape) -> Option<String> {
        match (self, shape) {
            (PriceError::ApiError { message, .. }, ErrorShape::ResponseMessage) => Some(message.clone()),
            (PriceError::Status { body, .. }, ErrorShape::ResponseBody) => Some(body.clone()),
            (PriceError::Status { status, .. }, ErrorShape::StatusText) => Some(format!("HTTP {}", status)),
            (PriceError::HttpError(e), ErrorShape::Cause) => Some(e.to_string()),
            (PriceError::AllSourcesFailed { details, .. }, ErrorShape::Reason) => Some(details.clone()),
            (_, ErrorShape::Message) => Some(self.to_string()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PriceError>;

/// One upstream that can quote a token in USD.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_usd_price(&self, symbol: &str, address: &Address) -> Result<f64>;
}

fn usable(source_name: &'static str, price: f64) -> Result<f64> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(PriceError::InvalidPrice {
            source_name,
            value: price.to_string(),
        })
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Address-keyed sources quote the wrapped token for the native asset.
fn priced_address(address: &Address) -> Address {
    if address::is_native(address) {
        address::wbnb()
    } else {
        *address
    }
}

async fn get_json(source_name: &'static str, request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PriceError::Status {
            source_name,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<Value>().await?)
}

/// CryptoCompare spot price by symbol
#[derive(Debug, Clone)]
pub struct CryptoCompareSource {
    client: Client,
    base_url: String,
}

impl CryptoCompareSource {
    pub const NAME: &'static str = "cryptocompare";

    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// `{"USD": 612.3}` or `{"Response": "Error", "Message": "..."}`
pub fn parse_cryptocompare(body: &Value) -> Result<f64> {
    if body.get("Response").and_then(Value::as_str) == Some("Error") {
        let message = body
            .get("Message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(PriceError::ApiError {
            source_name: CryptoCompareSource::NAME,
            message,
        });
    }
    let price = body
        .get("USD")
        .and_then(value_as_f64)
        .ok_or_else(|| PriceError::NotFound {
            source_name: CryptoCompareSource::NAME,
            token: "USD quote".to_string(),
        })?;
    usable(CryptoCompareSource::NAME, price)
}

#[async_trait]
impl PriceSource for CryptoCompareSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn fetch_usd_price(&self, symbol: &str, _address: &Address) -> Result<f64> {
        // CryptoCompare lists the native coin, not its wrapper
        let fsym = if symbol.eq_ignore_ascii_case("WBNB") {
            NATIVE_SYMBOL.to_string()
        } else {
            symbol.to_uppercase()
        };
        let url = format!("{}/data/price", self.base_url);
        debug!("Fetching {} price for {}", Self::NAME, fsym);
        let request = self
            .client
            .get(&url)
            .query(&[("fsym", fsym.as_str()), ("tsyms", "USD")]);
        let body = get_json(Self::NAME, request).await?;
        parse_cryptocompare(&body)
    }
}

/// GeckoTerminal simple token price by address
#[derive(Debug, Clone)]
pub struct GeckoTerminalSource {
    client: Client,
    base_url: String,
    network: String,
}

impl GeckoTerminalSource {
    pub const NAME: &'static str = "geckoterminal";

    pub fn new(client: Client, base_url: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            network: network.into(),
        }
    }
}

/// `data.attributes.token_prices[address]` as a decimal string
pub fn parse_geckoterminal(body: &Value, address: &Address) -> Result<f64> {
    let prices = body
        .pointer("/data/attributes/token_prices")
        .and_then(Value::as_object)
        .ok_or_else(|| PriceError::NotFound {
            source_name: GeckoTerminalSource::NAME,
            token: to_hex(address),
        })?;

    let price = prices
        .iter()
        .find(|(key, _)| address::matches_address(key, address))
        .and_then(|(_, value)| value_as_f64(value))
        .ok_or_else(|| PriceError::NotFound {
            source_name: GeckoTerminalSource::NAME,
            token: to_hex(address),
        })?;
    usable(GeckoTerminalSource::NAME, price)
}

#[async_trait]
impl PriceSource for GeckoTerminalSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn fetch_usd_price(&self, _symbol: &str, address: &Address) -> Result<f64> {
        let token = priced_address(address);
        let url = format!(
            "{}/simple/networks/{}/token_price/{}",
            self.base_url,
            self.network,
            to_hex(&token)
        );
        debug!("Fetching {} price for {}", Self::NAME, to_hex(&token));
        let request = self.client.get(&url).header("accept", "application/json");
        let body = get_json(Self::NAME, request).await?;
        parse_geckoterminal(&body, &token)
    }
}

/// DexScreener pair price by address
#[derive(Debug, Clone)]
pub struct DexScreenerSource {
    client: Client,
    base_url: String,
    chain_id: String,
}

impl DexScreenerSource {
    pub const NAME: &'static str = "dexscreener";

    pub fn new(client: Client, base_url: impl Into<String>, chain_id: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chain_id: chain_id.into(),
        }
    }
}

/// `priceUsd` of the most liquid pair on `chain_id` whose base token is
/// `address`.
pub fn parse_dexscreener(body: &Value, address: &Address, chain_id: &str) -> Result<f64> {
    let not_found = || PriceError::NotFound {
        source_name: DexScreenerSource::NAME,
        token: to_hex(address),
    };

    let pairs = body.get("pairs").and_then(Value::as_array).ok_or_else(not_found)?;

    let best = pairs
        .iter()
        .filter(|pair| pair.get("chainId").and_then(Value::as_str) == Some(chain_id))
        .filter(|pair| {
            pair.pointer("/baseToken/address")
                .and_then(Value::as_str)
                .map(|base| address::matches_address(base, address))
                .unwrap_or(false)
        })
        .filter_map(|pair| {
            let price = pair.get("priceUsd").and_then(value_as_f64)?;
            let liquidity = pair.pointer("/liquidity/usd").and_then(value_as_f64).unwrap_or(0.0);
            Some((price, liquidity))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(price, _)| price)
        .ok_or_else(not_found)?;

    usable(DexScreenerSource::NAME, best)
}

#[async_trait]
impl PriceSource for DexScreenerSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn fetch_usd_price(&self, _symbol: &str, address: &Address) -> Result<f64> {
        let token = priced_address(address);
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, to_hex(&token));
        debug!("Fetching {} price for {}", Self::NAME, to_hex(&token));
        let body = get_json(Self::NAME, self.client.get(&url)).await?;
        parse_dexscreener(&body, &token, &self.chain_id)
    }
}
