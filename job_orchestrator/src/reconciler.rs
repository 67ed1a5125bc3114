//! Merging the three explorer streams into one row per router call.

use std::collections::{HashMap, HashSet};

use ethers::types::{Address, U256};
use futures::stream::{self, StreamExt};
use ledger_core::address::{self, matches_address, to_hex};
use ledger_core::units::{gas_cost_native, parse_wei, scale_amount, scale_native};
use ledger_core::{
    BlockRange, InternalTransaction, Leg, LedgerError, NormalTransaction, RawTransaction,
    ReconciledLedger, ReconciledTransaction, SkippedTransaction, TokenMetadata,
    TokenTransferTransaction, TransactionStream, TxStatus,
};
use retry_utils::retry_with_backoff_if;
use tracing::{debug, info, warn};

use crate::{LedgerOrchestrator, OrchestratorError, Result};

const NO_LEGS_REASON: &str = "no transfer legs recorded";

/// A router call on its way to becoming a [`ReconciledTransaction`].
struct Candidate {
    tx: ReconciledTransaction,
    input: String,
}

impl LedgerOrchestrator {
    /// Reconcile every router call `wallet` made within `range`.
    ///
    /// The result is a pure function of the fetched rows: running it twice
    /// over the same upstream data yields the same ledger.
    pub async fn reconcile(&self, wallet: &Address, range: BlockRange) -> Result<ReconciledLedger> {
        info!(
            "🔄 Reconciling {} over blocks {}..{}",
            to_hex(wallet),
            range.start_block,
            range.end_block
        );

        let (normal, internal, tokens) = tokio::try_join!(
            self.fetch(TransactionStream::Normal, wallet, range),
            self.fetch(TransactionStream::Internal, wallet, range),
            self.fetch(TransactionStream::TokenTransfer, wallet, range),
        )?;
        let mut normal = normal_rows(normal);
        let internal = internal_rows(internal);
        let mut tokens = token_rows(tokens);

        if normal.is_empty() && tokens.is_empty() {
            info!("📭 No activity for {}", to_hex(wallet));
            return Ok(ReconciledLedger::default());
        }

        self.refetch_until_consistent(wallet, range, &mut normal, &mut tokens)
            .await?;

        let mut candidates = self.candidates(wallet, &normal);
        debug!(
            "{} router calls, {} internal rows, {} token rows",
            candidates.len(),
            internal.len(),
            tokens.len()
        );

        self.recover_failed_legs(&mut candidates).await;

        let by_hash: HashMap<String, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.tx.hash.to_ascii_lowercase(), i))
            .collect();
        self.overlay_internal(wallet, &internal, &by_hash, &mut candidates);
        self.overlay_tokens(wallet, &tokens, &by_hash, &mut candidates);

        let mut transactions = Vec::with_capacity(candidates.len());
        let mut skipped = Vec::new();
        for candidate in candidates {
            if candidate.tx.is_success() && !candidate.tx.has_leg() {
                let reason = self.skip_reason(&candidate);
                warn!("⚠️ Skipping {}: {}", candidate.tx.hash, reason);
                skipped.push(SkippedTransaction {
                    hash: candidate.tx.hash,
                    timestamp: candidate.tx.timestamp,
                    reason,
                });
                continue;
            }
            if !candidate.tx.is_success() || self.touches_tracked(&candidate.tx) {
                transactions.push(candidate.tx);
            }
        }

        transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.hash.cmp(&b.hash)));
        skipped.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.hash.cmp(&b.hash)));

        info!(
            "✅ Reconciled {}: {} transactions, {} skipped",
            to_hex(wallet),
            transactions.len(),
            skipped.len()
        );
        Ok(ReconciledLedger { transactions, skipped })
    }

    async fn fetch(
        &self,
        stream: TransactionStream,
        wallet: &Address,
        range: BlockRange,
    ) -> Result<Vec<RawTransaction>> {
        let rows = retry_with_backoff_if(
            stream.action(),
            &self.settings.retry,
            || self.source.fetch_stream(stream, wallet, range),
            |e: &LedgerError| e.is_retryable(),
        )
        .await?;
        Ok(rows)
    }

    /// Explorer indexes lag each other; a router call without token rows (or
    /// tracked token rows without their router call) gets a bounded re-fetch.
    async fn refetch_until_consistent(
        &self,
        wallet: &Address,
        range: BlockRange,
        normal: &mut Vec<NormalTransaction>,
        tokens: &mut Vec<TokenTransferTransaction>,
    ) -> Result<()> {
        for attempt in 1..=self.settings.consistency_refetch_attempts {
            let has_router_call = normal
                .iter()
                .any(|tx| self.is_router_call(wallet, tx) && is_success(tx));
            let touches_tracked = tokens.iter().any(|row| {
                address::parse_address(&row.contract_address)
                    .map(|token| self.tracked.contains(&token))
                    .unwrap_or(false)
            });

            if !has_router_call && touches_tracked {
                warn!("⚠️ Tracked token rows without router calls, re-fetching txlist (attempt {})", attempt);
                *normal = normal_rows(self.fetch(TransactionStream::Normal, wallet, range).await?);
            } else if has_router_call && tokens.is_empty() {
                warn!("⚠️ Router calls without token rows, re-fetching tokentx (attempt {})", attempt);
                *tokens = token_rows(self.fetch(TransactionStream::TokenTransfer, wallet, range).await?);
            } else {
                break;
            }
        }
        Ok(())
    }

    fn is_router_call(&self, wallet: &Address, tx: &NormalTransaction) -> bool {
        matches_address(&tx.from, wallet) && matches_address(&tx.to, &self.settings.router)
    }

    fn candidates(&self, wallet: &Address, normal: &[NormalTransaction]) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        normal
            .iter()
            .filter(|tx| self.is_router_call(wallet, tx))
            .filter(|tx| seen.insert(tx.hash.to_ascii_lowercase()))
            .map(|tx| {
                let status = TxStatus::from_explorer(&tx.is_error, &tx.txreceipt_status);
                let value = parse_wei(&tx.value).unwrap_or_default();
                let from = if status == TxStatus::Success && !value.is_zero() {
                    Some(Leg::native(scale_native(value)))
                } else {
                    None
                };
                Candidate {
                    tx: ReconciledTransaction {
                        hash: tx.hash.clone(),
                        timestamp: parse_timestamp(tx),
                        status,
                        gas_cost_native: gas_cost_native(&tx.gas_used, &tx.gas_price),
                        from,
                        to: None,
                        amount_usd: None,
                    },
                    input: tx.input.clone(),
                }
            })
            .collect()
    }

    /// Failed calls moved no tokens, so their intended legs come from the call
    /// data. The destination leg carries no amount.
    async fn recover_failed_legs(&self, candidates: &mut [Candidate]) {
        let failed: Vec<(usize, String, String)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.tx.is_success())
            .map(|(i, c)| (i, c.tx.hash.clone(), c.input.clone()))
            .collect();
        if failed.is_empty() {
            return;
        }
        debug!("Decoding {} failed transactions", failed.len());

        let recovered: Vec<(usize, Option<(Leg, Leg)>)> = stream::iter(failed)
            .map(|(i, hash, input)| async move { (i, self.intended_legs(&hash, &input).await) })
            .buffer_unordered(self.settings.decode_concurrency.max(1))
            .collect()
            .await;

        for (i, legs) in recovered {
            if let Some((from, to)) = legs {
                candidates[i].tx.from = Some(from);
                candidates[i].tx.to = Some(to);
            }
        }
    }

    async fn intended_legs(&self, hash: &str, input: &str) -> Option<(Leg, Leg)> {
        let decoded = retry_with_backoff_if(
            "failed tx decode",
            &self.settings.retry,
            || self.decode_legs(hash, input),
            |e: &OrchestratorError| e.is_retryable(),
        )
        .await;

        match decoded {
            Ok(legs) => Some(legs),
            Err(OrchestratorError::Decode(e)) => {
                debug!("Cannot decode failed tx {}: {}", hash, e);
                None
            }
            Err(e) => {
                warn!("⚠️ Leaving legs unset for failed tx {}: {}", hash, e);
                None
            }
        }
    }

    async fn decode_legs(&self, hash: &str, input: &str) -> Result<(Leg, Leg)> {
        let swap = self.decoder.decode_hex(hash, input)?;
        let (from_meta, to_meta) = tokio::try_join!(
            self.metadata.resolve(&swap.from_token),
            self.metadata.resolve(&swap.to_token),
        )?;

        let amount = scale_amount(swap.amount, from_meta.decimals);
        Ok((
            Leg::new(swap.from_token, from_meta, amount),
            Leg::new(swap.to_token, to_meta, 0.0),
        ))
    }

    /// Native proceeds paid out by the router land on the destination leg.
    fn overlay_internal(
        &self,
        wallet: &Address,
        internal: &[InternalTransaction],
        by_hash: &HashMap<String, usize>,
        candidates: &mut [Candidate],
    ) {
        for row in internal {
            let Some(&i) = by_hash.get(&row.hash.to_ascii_lowercase()) else {
                continue;
            };
            if !matches_address(&row.from, &self.settings.router) || !matches_address(&row.to, wallet) {
                continue;
            }
            if let Some(value) = parse_wei(&row.value) {
                candidates[i].tx.to = Some(Leg::native(scale_native(value)));
            }
        }
    }

    fn overlay_tokens(
        &self,
        wallet: &Address,
        tokens: &[TokenTransferTransaction],
        by_hash: &HashMap<String, usize>,
        candidates: &mut [Candidate],
    ) {
        for row in tokens {
            let Some(&i) = by_hash.get(&row.hash.to_ascii_lowercase()) else {
                continue;
            };
            let Some(raw) = parse_wei(&row.value) else {
                continue;
            };
            if raw == U256::one() || (raw.is_zero() && !self.settings.keep_zero_value_transfers) {
                debug!("Dropping dust transfer of {} in {}", row.token_symbol, row.hash);
                continue;
            }
            let token = match address::parse_address(&row.contract_address) {
                Ok(token) => token,
                Err(_) => {
                    debug!("Ignoring transfer with malformed contract {}", row.contract_address);
                    continue;
                }
            };

            let decimals = match row.token_decimal.trim().parse::<u8>() {
                Ok(decimals) => decimals,
                Err(_) => {
                    warn!(
                        "⚠️ Ignoring {} transfer in {} with unreadable decimals '{}'",
                        row.token_symbol, row.hash, row.token_decimal
                    );
                    continue;
                }
            };
            let metadata = TokenMetadata::new(address::normalize_symbol(&token, &row.token_symbol), decimals);
            let leg = Leg::new(token, metadata, scale_amount(raw, decimals));

            let tx = &mut candidates[i].tx;
            if matches_address(&row.from, wallet) {
                tx.from = Some(leg);
            } else if matches_address(&row.to, wallet) {
                tx.to = Some(leg);
            }
        }
    }

    fn skip_reason(&self, candidate: &Candidate) -> String {
        match self.decoder.decode_hex(&candidate.tx.hash, &candidate.input) {
            Err(e) => e.to_string(),
            Ok(_) => NO_LEGS_REASON.to_string(),
        }
    }

    fn touches_tracked(&self, tx: &ReconciledTransaction) -> bool {
        tx.from_address()
            .into_iter()
            .chain(tx.to_address())
            .any(|a| self.tracked.contains(a))
    }
}

fn parse_timestamp(tx: &NormalTransaction) -> i64 {
    match tx.time_stamp.trim().parse() {
        Ok(timestamp) => timestamp,
        Err(_) => {
            warn!("⚠️ Unreadable timeStamp '{}' on {}, listing it at 0", tx.time_stamp, tx.hash);
            0
        }
    }
}

fn is_success(tx: &NormalTransaction) -> bool {
    TxStatus::from_explorer(&tx.is_error, &tx.txreceipt_status) == TxStatus::Success
}

fn normal_rows(rows: Vec<RawTransaction>) -> Vec<NormalTransaction> {
    rows.into_iter()
        .filter_map(|row| match row {
            RawTransaction::Normal(tx) => Some(tx),
            _ => None,
        })
        .collect()
}

fn internal_rows(rows: Vec<RawTransaction>) -> Vec<InternalTransaction> {
    rows.into_iter()
        .filter_map(|row| match row {
            RawTransaction::Internal(tx) => Some(tx),
            _ => None,
        })
        .collect()
}

fn token_rows(rows: Vec<RawTransaction>) -> Vec<TokenTransferTransaction> {
    rows.into_iter()
        .filter_map(|row| match row {
            RawTransaction::TokenTransfer(tx) => Some(tx),
            _ => None,
        })
        .collect()
}
