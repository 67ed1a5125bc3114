use std::collections::HashMap;

use ethers::types::Address;
use futures::stream::{self, StreamExt, TryStreamExt};
use ledger_core::address::to_hex;
use ledger_core::{
    accumulate_flows, bucket_key, calculate_points, total_profit_usd, trading_volume, BlockRange,
    LedgerError, ReconciledTransaction, TokenSummary, WalletMetrics, WalletReport,
};
use retry_utils::retry_with_backoff_if;
use tracing::{debug, info};

use crate::{LedgerOrchestrator, Result};

impl LedgerOrchestrator {
    /// Per-token flows over successful transactions, each priced in USD.
    ///
    /// One price lookup per distinct token. Any lookup that exhausts every
    /// source fails the whole aggregate.
    pub async fn aggregate(&self, transactions: &[ReconciledTransaction]) -> Result<Vec<TokenSummary>> {
        let flows = accumulate_flows(transactions);
        if flows.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Pricing {} tokens", flows.len());

        // `buffered` keeps the address order of `flows`
        let summaries: Vec<TokenSummary> = stream::iter(flows)
            .map(|flow| async move {
                let price = retry_with_backoff_if(
                    "price lookup",
                    &self.settings.retry,
                    || self.prices.fetch_price(&flow.symbol, &flow.address),
                    |e: &LedgerError| e.is_retryable(),
                )
                .await?;
                Ok::<_, LedgerError>((flow, price))
            })
            .buffered(self.settings.price_concurrency.max(1))
            .map_ok(|(flow, price)| TokenSummary::from_flow(flow, price))
            .try_collect()
            .await?;

        Ok(summaries)
    }

    /// Reconcile, price and score one wallet.
    pub async fn build_report(&self, wallet: &Address, range: BlockRange) -> Result<WalletReport> {
        let ledger = self.reconcile(wallet, range).await?;
        let token_summaries = self.aggregate(&ledger.transactions).await?;

        let prices: HashMap<Address, f64> = token_summaries
            .iter()
            .map(|summary| (summary.address, summary.price))
            .collect();

        let mut transactions = ledger.transactions;
        for tx in transactions.iter_mut() {
            tx.amount_usd = tx
                .from
                .as_ref()
                .and_then(|leg| prices.get(&bucket_key(&leg.address)).map(|price| leg.amount * price));
        }

        let trading_volume_usd = trading_volume(&transactions, &prices, &self.tracked, self.settings.buy_policy);
        let points = calculate_points(trading_volume_usd * self.settings.points_volume_multiplier);
        let metrics = WalletMetrics {
            trading_volume_usd,
            points,
            total_profit_usd: total_profit_usd(&token_summaries),
        };

        info!(
            "📊 {}: volume ${:.2}, {} points, profit ${}",
            to_hex(wallet),
            metrics.trading_volume_usd,
            metrics.points.points,
            metrics.total_profit_usd
        );

        Ok(WalletReport {
            address: *wallet,
            block_range: range,
            transactions,
            token_summaries,
            metrics,
            skipped: ledger.skipped,
        })
    }
}
