//! Folding reconciled transactions into per-token flows and wallet metrics.

use std::collections::{BTreeMap, HashMap};

use ethers::types::Address;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::address::{self, NATIVE_SYMBOL, ZERO_ADDRESS};
use crate::tracked::TrackedTokenList;
use crate::types::{PointsTier, ReconciledTransaction, TokenSummary};

/// Accumulated in/out totals for one token, before pricing.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenFlow {
    pub address: Address,
    pub symbol: String,
    pub inflow: f64,
    pub outflow: f64,
}

impl TokenFlow {
    fn new(address: Address, symbol: &str) -> Self {
        Self {
            address,
            symbol: symbol.to_string(),
            inflow: 0.0,
            outflow: 0.0,
        }
    }

    pub fn net_flow(&self) -> f64 {
        self.inflow - self.outflow
    }
}

/// Flow and price key of a token; both native sentinels share one bucket.
pub fn bucket_key(address: &Address) -> Address {
    if address::is_native(address) {
        ZERO_ADDRESS
    } else {
        *address
    }
}

/// Sum flows over successful transactions.
///
/// Gas always lands in the native bucket's outflow. Output is ordered by token
/// address so repeated runs serialize identically.
pub fn accumulate_flows(transactions: &[ReconciledTransaction]) -> Vec<TokenFlow> {
    let mut flows: BTreeMap<Address, TokenFlow> = BTreeMap::new();

    for tx in transactions.iter().filter(|tx| tx.is_success()) {
        if let Some(from) = &tx.from {
            let key = bucket_key(&from.address);
            flows
                .entry(key)
                .or_insert_with(|| TokenFlow::new(key, &from.symbol))
                .outflow += from.amount;
        }
        if let Some(to) = &tx.to {
            let key = bucket_key(&to.address);
            flows
                .entry(key)
                .or_insert_with(|| TokenFlow::new(key, &to.symbol))
                .inflow += to.amount;
        }
        flows
            .entry(ZERO_ADDRESS)
            .or_insert_with(|| TokenFlow::new(ZERO_ADDRESS, NATIVE_SYMBOL))
            .outflow += tx.gas_cost_native;
    }

    flows.into_values().collect()
}

/// Two-decimal USD rendering. Zero and values that round to zero print as
/// `"0.00"`, never `"-0.00"`.
pub fn format_usd(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0.00".to_string();
    }
    let rounded = Decimal::from_f64_retain(value)
        .unwrap_or_default()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        "0.00".to_string()
    } else {
        format!("{:.2}", rounded)
    }
}

pub fn profit_usd(net_flow: f64, price: f64) -> String {
    if net_flow == 0.0 {
        return "0.00".to_string();
    }
    format_usd(net_flow * price)
}

impl TokenSummary {
    pub fn from_flow(flow: TokenFlow, price: f64) -> Self {
        let net_flow = flow.net_flow();
        Self {
            address: flow.address,
            symbol: flow.symbol,
            inflow: flow.inflow,
            outflow: flow.outflow,
            price,
            net_flow,
            profit_usd: profit_usd(net_flow, price),
        }
    }
}

/// Sum of per-token profit over tokens with a non-zero net flow.
pub fn total_profit_usd(summaries: &[TokenSummary]) -> String {
    let total: f64 = summaries
        .iter()
        .filter(|summary| summary.net_flow != 0.0)
        .map(|summary| summary.net_flow * summary.price)
        .sum();
    format_usd(total)
}

/// Milestone points for a trading value.
///
/// # Panics
/// On negative or NaN input; upstream volume is non-negative by construction.
pub fn calculate_points(value: f64) -> PointsTier {
    assert!(value >= 0.0, "points value must be non-negative, got {value}");

    if value < 2.0 {
        return PointsTier {
            value,
            points: 0,
            range: [0.0, 2.0],
        };
    }

    let exponent = value.log2().floor() as i32;
    PointsTier {
        value,
        points: exponent as u32,
        range: [2f64.powi(exponent), 2f64.powi(exponent + 1)],
    }
}

/// How a successful transaction is recognised as a buy of a tracked token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyPolicy {
    /// The destination leg is a tracked token.
    #[default]
    TrackedDestination,
    /// The destination leg is tracked and the source leg is a quote asset
    /// (native, WBNB, USDT or USDC).
    QuoteToTracked,
}

impl std::str::FromStr for BuyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tracked_destination" => Ok(BuyPolicy::TrackedDestination),
            "quote_to_tracked" => Ok(BuyPolicy::QuoteToTracked),
            other => Err(format!("unknown buy policy '{}'", other)),
        }
    }
}

pub fn is_buy(tx: &ReconciledTransaction, tracked: &TrackedTokenList, policy: BuyPolicy) -> bool {
    if !tx.is_success() {
        return false;
    }
    let destination_tracked = tx.to_address().map(|a| tracked.contains(a)).unwrap_or(false);
    match policy {
        BuyPolicy::TrackedDestination => destination_tracked,
        BuyPolicy::QuoteToTracked => {
            destination_tracked && tx.from_address().map(address::is_quote_asset).unwrap_or(false)
        }
    }
}

pub fn is_sell(tx: &ReconciledTransaction, tracked: &TrackedTokenList) -> bool {
    tx.from_address().map(|a| tracked.contains(a)).unwrap_or(false)
}

/// USD value spent on buys, priced with the per-token map.
pub fn trading_volume(
    transactions: &[ReconciledTransaction],
    prices: &HashMap<Address, f64>,
    tracked: &TrackedTokenList,
    policy: BuyPolicy,
) -> f64 {
    transactions
        .iter()
        .filter(|tx| is_buy(tx, tracked, policy))
        .filter_map(|tx| tx.from.as_ref())
        .map(|leg| leg.amount * prices.get(&bucket_key(&leg.address)).copied().unwrap_or(0.0))
        .sum()
}

/// Listing filter offered to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionView {
    #[default]
    All,
    Buy,
    Sell,
}

impl std::str::FromStr for TransactionView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TransactionView::All),
            "buy" => Ok(TransactionView::Buy),
            "sell" => Ok(TransactionView::Sell),
            other => Err(format!("unknown view '{}', expected all, buy or sell", other)),
        }
    }
}

pub fn filter_transactions<'a>(
    transactions: &'a [ReconciledTransaction],
    tracked: &TrackedTokenList,
    view: TransactionView,
    show_failed: bool,
) -> Vec<&'a ReconciledTransaction> {
    transactions
        .iter()
        .filter(|tx| match view {
            TransactionView::All => true,
            TransactionView::Buy => tx.to_address().map(|a| tracked.contains(a)).unwrap_or(false),
            TransactionView::Sell => is_sell(tx, tracked),
        })
        .filter(|tx| show_failed || tx.is_success())
        .collect()
}
