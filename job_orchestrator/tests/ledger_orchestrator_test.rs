use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::{Address, U256};
use job_orchestrator::{LedgerOrchestrator, LedgerSettings, OrchestratorError};
use ledger_core::address::{parse_address, usdt, ZERO_ADDRESS};
use ledger_core::{
    BlockRange, BuyPolicy, InternalTransaction, LedgerError, NormalTransaction, PriceFetcher,
    RawTransaction, TokenMetadata, TokenMetadataProvider, TokenTransferTransaction, TrackedToken,
    TrackedTokenList, TransactionSource, TransactionStream, TxStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WALLET: &str = "0x8894e0a0c962cb723c1976a4421c95949be2d4e3";
const ROUTER: &str = "0xB300000b72DEAEB607a12d5f54773D1C19c7028d";
const ALPHA: &str = "0x1111111111111111111111111111111111111111";
const BETA: &str = "0x3333333333333333333333333333333333333333";
const OTHER: &str = "0x2222222222222222222222222222222222222222";
const USDT: &str = "0x55d398326f99059ff775485246999027b3197955";

fn addr(raw: &str) -> Address {
    parse_address(raw).unwrap()
}

fn wei(units: u64) -> String {
    (U256::exp10(18) * U256::from(units)).to_string()
}

struct FakeSource {
    normal: Vec<RawTransaction>,
    internal: Vec<RawTransaction>,
    tokens: Vec<RawTransaction>,
    /// Token fetches answered with an empty list before the real rows appear.
    lagging_token_fetches: u32,
    /// Normal fetches that fail before succeeding.
    failing_normal_fetches: u32,
    /// Every normal fetch is refused with bad credentials.
    reject_normal_fetches: bool,
    calls: AtomicU32,
    token_calls: AtomicU32,
    normal_calls: AtomicU32,
}

impl FakeSource {
    fn new(normal: Vec<RawTransaction>, internal: Vec<RawTransaction>, tokens: Vec<RawTransaction>) -> Self {
        Self {
            normal,
            internal,
            tokens,
            lagging_token_fetches: 0,
            failing_normal_fetches: 0,
            reject_normal_fetches: false,
            calls: AtomicU32::new(0),
            token_calls: AtomicU32::new(0),
            normal_calls: AtomicU32::new(0),
        }
    }

    fn empty() -> Self {
        Self::new(vec![], vec![], vec![])
    }
}

#[async_trait]
impl TransactionSource for FakeSource {
    async fn fetch_stream(
        &self,
        stream: TransactionStream,
        _address: &Address,
        _range: BlockRange,
    ) -> ledger_core::Result<Vec<RawTransaction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match stream {
            TransactionStream::Normal => {
                let n = self.normal_calls.fetch_add(1, Ordering::SeqCst);
                if self.reject_normal_fetches {
                    return Err(LedgerError::UpstreamRejected {
                        stream,
                        message: "Authentication failed".to_string(),
                    });
                }
                if n < self.failing_normal_fetches {
                    return Err(LedgerError::UpstreamUnavailable {
                        stream,
                        message: "HTTP 502".to_string(),
                    });
                }
                Ok(self.normal.clone())
            }
            TransactionStream::Internal => Ok(self.internal.clone()),
            TransactionStream::TokenTransfer => {
                let n = self.token_calls.fetch_add(1, Ordering::SeqCst);
                if n < self.lagging_token_fetches {
                    return Ok(vec![]);
                }
                Ok(self.tokens.clone())
            }
        }
    }
}

#[derive(Default)]
struct FakeMetadata {
    calls: AtomicU32,
}

#[async_trait]
impl TokenMetadataProvider for FakeMetadata {
    async fn resolve(&self, address: &Address) -> ledger_core::Result<TokenMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *address == addr(ALPHA) {
            Ok(TokenMetadata::new("ALPHA", 18))
        } else if *address == usdt() {
            Ok(TokenMetadata::new("USDT", 18))
        } else {
            Err(LedgerError::Metadata {
                address: format!("{:#x}", address),
                message: "execution reverted".to_string(),
            })
        }
    }
}

struct FakePrices {
    prices: HashMap<Address, f64>,
    calls: AtomicU32,
}

impl FakePrices {
    fn standard() -> Self {
        Self {
            prices: HashMap::from([
                (ZERO_ADDRESS, 600.0),
                (addr(ALPHA), 0.5),
                (addr(BETA), 2.0),
                (usdt(), 1.0),
            ]),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PriceFetcher for FakePrices {
    async fn fetch_price(&self, symbol: &str, address: &Address) -> ledger_core::Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prices
            .get(address)
            .copied()
            .ok_or_else(|| LedgerError::AllPriceSourcesFailed {
                symbol: symbol.to_string(),
                address: format!("{:#x}", address),
                details: "no quote".to_string(),
            })
    }
}

/// Tracks how many calls are running at once.
#[derive(Default)]
struct InFlight {
    current: AtomicU32,
    peak: AtomicU32,
}

impl InFlight {
    async fn hold(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct SlowMetadata {
    in_flight: InFlight,
}

#[async_trait]
impl TokenMetadataProvider for SlowMetadata {
    async fn resolve(&self, address: &Address) -> ledger_core::Result<TokenMetadata> {
        self.in_flight.hold().await;
        FakeMetadata::default().resolve(address).await
    }
}

#[derive(Default)]
struct SlowPrices {
    in_flight: InFlight,
}

#[async_trait]
impl PriceFetcher for SlowPrices {
    async fn fetch_price(&self, _symbol: &str, _address: &Address) -> ledger_core::Result<f64> {
        self.in_flight.hold().await;
        Ok(1.0)
    }
}

fn tracked() -> Arc<TrackedTokenList> {
    let token = |address: &str, symbol: &str| TrackedToken {
        contract_address: address.to_string(),
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        decimals: 18,
        chain_id: "56".to_string(),
    };
    Arc::new(TrackedTokenList::new(vec![token(ALPHA, "ALPHA"), token(BETA, "BETA")]))
}

fn normal(hash: &str, ts: i64, to: &str, value: &str, success: bool, input: &str) -> RawTransaction {
    RawTransaction::Normal(NormalTransaction {
        hash: hash.to_string(),
        time_stamp: ts.to_string(),
        from: WALLET.to_string(),
        to: to.to_string(),
        value: value.to_string(),
        gas_used: "100000".to_string(),
        gas_price: "1000000000".to_string(),
        input: input.to_string(),
        is_error: if success { "0" } else { "1" }.to_string(),
        txreceipt_status: if success { "1" } else { "0" }.to_string(),
        ..Default::default()
    })
}

fn internal(hash: &str, from: &str, to: &str, value: &str) -> RawTransaction {
    RawTransaction::Internal(InternalTransaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value: value.to_string(),
        call_type: "call".to_string(),
        is_error: "0".to_string(),
        ..Default::default()
    })
}

fn transfer(hash: &str, token: &str, symbol: &str, from: &str, to: &str, value: &str) -> RawTransaction {
    RawTransaction::TokenTransfer(TokenTransferTransaction {
        hash: hash.to_string(),
        contract_address: token.to_string(),
        token_symbol: symbol.to_string(),
        token_decimal: "18".to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value: value.to_string(),
        ..Default::default()
    })
}

fn packed(token: Address) -> U256 {
    let mut word = [0u8; 32];
    word[0] = 0x80;
    word[12..].copy_from_slice(token.as_bytes());
    U256::from_big_endian(&word)
}

/// Bridged router entry wrapping a 1inch `swap`, selling `amount` of `src`.
fn bridged_swap_input(src: Address, dst: Address, amount: U256) -> String {
    let mut inner = vec![0x07, 0xed, 0x23, 0x79];
    inner.extend(encode(&[
        Token::Address(Address::repeat_byte(0x44)),
        Token::Tuple(vec![
            Token::Address(src),
            Token::Address(dst),
            Token::Address(Address::repeat_byte(0x45)),
            Token::Address(Address::repeat_byte(0x46)),
            Token::Uint(amount),
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
        ]),
        Token::Bytes(vec![]),
    ]));

    let mut data = vec![0xa0, 0x3d, 0xe6, 0xa9];
    data.extend(encode(&[
        Token::Uint(packed(src)),
        Token::Uint(amount),
        Token::Uint(packed(dst)),
        Token::Bytes(inner),
    ]));
    format!("0x{}", hex::encode(data))
}

/// A wallet history exercising every overlay rule.
fn busy_wallet() -> FakeSource {
    let normal_rows = vec![
        // BNB -> ALPHA
        normal("0xa1", 1_000, ROUTER, "500000000000000000", true, "0x"),
        normal("0xa1", 1_000, ROUTER, "500000000000000000", true, "0x"),
        // ALPHA -> BNB, proceeds paid internally
        normal("0xa2", 2_000, ROUTER, "0", true, "0x"),
        // failed USDT -> ALPHA
        normal(
            "0xa3",
            3_000,
            ROUTER,
            "0",
            false,
            &bridged_swap_input(usdt(), addr(ALPHA), U256::exp10(18) * U256::from(25)),
        ),
        // succeeded but moved nothing we can see
        normal(
            "0xa4",
            1_500,
            ROUTER,
            "0",
            true,
            "0xa9059cbb0000000000000000000000002222222222222222222222222222222222222222",
        ),
        // USDT -> untracked token
        normal("0xa5", 500, ROUTER, "0", true, "0x"),
        // ALPHA -> BETA
        normal("0xa6", 2_500, ROUTER, "0", true, "0x"),
        // not a router call
        normal("0xa7", 4_000, OTHER, &wei(3), true, "0x"),
    ];
    let internal_rows = vec![
        internal("0xa2", ROUTER, WALLET, "200000000000000000"),
        internal("0xa7", OTHER, WALLET, &wei(3)),
    ];
    let token_rows = vec![
        transfer("0xa1", ALPHA, "ALPHA", ROUTER, WALLET, &wei(100)),
        transfer("0xa1", OTHER, "SPAM", ROUTER, WALLET, "1"),
        transfer("0xa1", OTHER, "SPAM", ROUTER, WALLET, "0"),
        transfer("0xa2", ALPHA, "ALPHA", WALLET, ROUTER, &wei(40)),
        transfer("0xa5", USDT, "BSC-USD", WALLET, ROUTER, &wei(10)),
        transfer("0xa5", OTHER, "OTHER", ROUTER, WALLET, &wei(5)),
        transfer("0xa6", ALPHA, "ALPHA", WALLET, ROUTER, &wei(10)),
        transfer("0xa6", BETA, "BETA", ROUTER, WALLET, &wei(20)),
    ];
    FakeSource::new(normal_rows, internal_rows, token_rows)
}

struct Harness {
    orchestrator: LedgerOrchestrator,
    source: Arc<FakeSource>,
    metadata: Arc<FakeMetadata>,
    prices: Arc<FakePrices>,
}

fn harness(source: FakeSource, settings: LedgerSettings) -> Harness {
    let source = Arc::new(source);
    let metadata = Arc::new(FakeMetadata::default());
    let prices = Arc::new(FakePrices::standard());
    let orchestrator = LedgerOrchestrator::new(
        source.clone(),
        metadata.clone(),
        prices.clone(),
        tracked(),
        settings,
    );
    Harness {
        orchestrator,
        source,
        metadata,
        prices,
    }
}

#[tokio::test]
async fn test_reconcile_merges_streams() {
    let h = harness(busy_wallet(), LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    let hashes: Vec<&str> = ledger.transactions.iter().map(|tx| tx.hash.as_str()).collect();
    assert_eq!(hashes, vec!["0xa3", "0xa6", "0xa2", "0xa1"]);

    let bnb_for_alpha = &ledger.transactions[3];
    let from = bnb_for_alpha.from.as_ref().unwrap();
    assert!(from.is_native());
    assert_eq!(from.amount, 0.5);
    let to = bnb_for_alpha.to.as_ref().unwrap();
    assert_eq!(to.address, addr(ALPHA));
    assert_eq!(to.amount, 100.0);
    assert!((bnb_for_alpha.gas_cost_native - 0.0001).abs() < 1e-12);

    let alpha_for_bnb = &ledger.transactions[2];
    assert_eq!(alpha_for_bnb.from.as_ref().unwrap().amount, 40.0);
    let proceeds = alpha_for_bnb.to.as_ref().unwrap();
    assert!(proceeds.is_native());
    assert_eq!(proceeds.amount, 0.2);
}

#[tokio::test]
async fn test_failed_transaction_recovers_intended_legs() {
    let h = harness(busy_wallet(), LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    let failed = &ledger.transactions[0];
    assert_eq!(failed.status, TxStatus::Failed);
    let from = failed.from.as_ref().unwrap();
    assert_eq!(from.symbol, "USDT");
    assert_eq!(from.amount, 25.0);
    let to = failed.to.as_ref().unwrap();
    assert_eq!(to.symbol, "ALPHA");
    assert_eq!(to.amount, 0.0);
    assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_legless_success_is_reported_as_skipped() {
    let h = harness(busy_wallet(), LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    assert_eq!(ledger.skipped.len(), 1);
    assert_eq!(ledger.skipped[0].hash, "0xa4");
    assert_eq!(ledger.skipped[0].timestamp, 1_500);
    assert!(ledger.skipped[0].reason.contains("0xa9059cbb"), "{}", ledger.skipped[0].reason);
}

#[tokio::test]
async fn test_dust_transfers_do_not_replace_legs() {
    let h = harness(busy_wallet(), LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    let tx = ledger.transactions.iter().find(|tx| tx.hash == "0xa1").unwrap();
    assert_eq!(tx.to.as_ref().unwrap().symbol, "ALPHA");
}

#[tokio::test]
async fn test_zero_value_transfers_kept_only_when_configured() {
    let source = || {
        FakeSource::new(
            vec![normal("0xe1", 10, ROUTER, "0", true, "0x")],
            vec![],
            vec![
                transfer("0xe1", ALPHA, "ALPHA", WALLET, ROUTER, &wei(5)),
                transfer("0xe1", OTHER, "SPAM", ROUTER, WALLET, "0"),
            ],
        )
    };

    let h = harness(source(), LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();
    assert_eq!(ledger.transactions[0].to, None);

    let settings = LedgerSettings {
        keep_zero_value_transfers: true,
        ..LedgerSettings::default()
    };
    let h = harness(source(), settings);
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();
    let to = ledger.transactions[0].to.as_ref().unwrap();
    assert_eq!(to.symbol, "SPAM");
    assert_eq!(to.amount, 0.0);
}

#[tokio::test]
async fn test_native_value_leg_needs_no_decoding() {
    let source = FakeSource::new(
        vec![normal("0xb1", 10, ROUTER, "250000000000000000", true, "0xdeadbeef")],
        vec![],
        vec![transfer("0xb1", ALPHA, "ALPHA", ROUTER, WALLET, &wei(7))],
    );
    let h = harness(source, LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    assert_eq!(ledger.transactions.len(), 1);
    let from = ledger.transactions[0].from.as_ref().unwrap();
    assert_eq!(from.symbol, "BNB");
    assert_eq!(from.decimals, 18);
    assert_eq!(from.amount, 0.25);
    assert!(ledger.skipped.is_empty());
    assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let h = harness(busy_wallet(), LedgerSettings::default());
    let first = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();
    let second = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_wallet_makes_no_downstream_calls() {
    let h = harness(FakeSource::empty(), LedgerSettings::default());
    let report = h.orchestrator.build_report(&addr(WALLET), BlockRange::default()).await.unwrap();

    assert!(report.transactions.is_empty());
    assert!(report.token_summaries.is_empty());
    assert!(report.skipped.is_empty());
    assert_eq!(report.metrics.trading_volume_usd, 0.0);
    assert_eq!(report.metrics.points.points, 0);
    assert_eq!(report.metrics.total_profit_usd, "0.00");
    assert_eq!(h.source.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.prices.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lagging_token_stream_is_refetched() {
    let mut source = FakeSource::new(
        vec![normal("0xc1", 10, ROUTER, "250000000000000000", true, "0x")],
        vec![],
        vec![transfer("0xc1", ALPHA, "ALPHA", ROUTER, WALLET, &wei(7))],
    );
    source.lagging_token_fetches = 2;
    let h = harness(source, LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    assert_eq!(h.source.token_calls.load(Ordering::SeqCst), 3);
    assert_eq!(ledger.transactions[0].to.as_ref().unwrap().amount, 7.0);
}

#[tokio::test]
async fn test_upstream_failures_are_retried_then_propagated() {
    let mut flaky = busy_wallet();
    flaky.failing_normal_fetches = 2;
    let h = harness(flaky, LedgerSettings::default());
    assert!(h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.is_ok());

    let mut down = busy_wallet();
    down.failing_normal_fetches = u32::MAX;
    let h = harness(down, LedgerSettings::default());
    let err = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Ledger(LedgerError::UpstreamUnavailable { .. })
    ));
    // one attempt plus three retries
    assert_eq!(h.source.normal_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_report_prices_flows_and_scores_volume() {
    let h = harness(busy_wallet(), LedgerSettings::default());
    let report = h.orchestrator.build_report(&addr(WALLET), BlockRange::default()).await.unwrap();

    let symbols: Vec<&str> = report.token_summaries.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BNB", "ALPHA", "BETA"]);
    assert_eq!(h.prices.calls.load(Ordering::SeqCst), 3);

    let native = &report.token_summaries[0];
    assert_eq!(native.address, ZERO_ADDRESS);
    assert!((native.outflow - 0.5003).abs() < 1e-9);
    assert_eq!(native.inflow, 0.2);
    assert_eq!(native.profit_usd, "-180.18");

    let alpha = &report.token_summaries[1];
    assert_eq!(alpha.inflow, 100.0);
    assert_eq!(alpha.outflow, 50.0);
    assert_eq!(alpha.profit_usd, "25.00");
    assert_eq!(report.token_summaries[2].profit_usd, "40.00");
    assert_eq!(report.metrics.total_profit_usd, "-115.18");

    // BNB -> ALPHA (300) plus ALPHA -> BETA (5)
    assert!((report.metrics.trading_volume_usd - 305.0).abs() < 1e-9);
    assert_eq!(report.metrics.points.points, 9);
    assert_eq!(report.metrics.points.range, [512.0, 1024.0]);

    let bnb_for_alpha = report.transactions.iter().find(|tx| tx.hash == "0xa1").unwrap();
    assert_eq!(bnb_for_alpha.amount_usd, Some(300.0));
    let failed = report.transactions.iter().find(|tx| tx.hash == "0xa3").unwrap();
    assert_eq!(failed.amount_usd, None);
}

#[tokio::test]
async fn test_quote_to_tracked_policy_excludes_token_to_token_buys() {
    let settings = LedgerSettings {
        buy_policy: BuyPolicy::QuoteToTracked,
        ..LedgerSettings::default()
    };
    let h = harness(busy_wallet(), settings);
    let report = h.orchestrator.build_report(&addr(WALLET), BlockRange::default()).await.unwrap();
    assert!((report.metrics.trading_volume_usd - 300.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_price_failure_fails_the_report() {
    let source = FakeSource::new(
        vec![normal("0xd1", 10, ROUTER, "0", true, "0x")],
        vec![],
        vec![
            transfer("0xd1", OTHER, "OTHER", WALLET, ROUTER, &wei(1)),
            transfer("0xd1", ALPHA, "ALPHA", ROUTER, WALLET, &wei(2)),
        ],
    );
    let h = harness(source, LedgerSettings::default());
    let err = h.orchestrator.build_report(&addr(WALLET), BlockRange::default()).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Ledger(LedgerError::AllPriceSourcesFailed { .. })
    ));
}

#[tokio::test]
async fn test_rejected_credentials_are_not_retried() {
    let mut source = busy_wallet();
    source.reject_normal_fetches = true;
    let h = harness(source, LedgerSettings::default());

    let err = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Ledger(LedgerError::UpstreamRejected { .. })
    ));
    assert_eq!(h.source.normal_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_undecodable_failed_call_is_tried_once() {
    let source = FakeSource::new(
        vec![normal("0xd2", 10, ROUTER, "0", false, "0xa9059cbb")],
        vec![],
        vec![],
    );
    let h = harness(source, LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    assert_eq!(ledger.transactions.len(), 1);
    assert_eq!(ledger.transactions[0].from, None);
    assert_eq!(ledger.transactions[0].to, None);
    assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_call_metadata_errors_are_retried() {
    let source = FakeSource::new(
        vec![normal(
            "0xd3",
            10,
            ROUTER,
            "0",
            false,
            &bridged_swap_input(addr(OTHER), addr(OTHER), U256::exp10(18)),
        )],
        vec![],
        vec![],
    );
    let h = harness(source, LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    assert_eq!(ledger.transactions[0].from, None);
    // every attempt resolves at least one side before failing
    assert!(h.metadata.calls.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn test_failed_call_decoding_respects_concurrency_limit() {
    let normal_rows = (0..20)
        .map(|i| {
            normal(
                &format!("0xf{:02x}", i),
                100 + i,
                ROUTER,
                "0",
                false,
                &bridged_swap_input(usdt(), addr(ALPHA), U256::exp10(18)),
            )
        })
        .collect();
    let metadata = Arc::new(SlowMetadata::default());
    let settings = LedgerSettings {
        decode_concurrency: 3,
        ..LedgerSettings::default()
    };
    let orchestrator = LedgerOrchestrator::new(
        Arc::new(FakeSource::new(normal_rows, vec![], vec![])),
        metadata.clone(),
        Arc::new(FakePrices::standard()),
        tracked(),
        settings,
    );

    let ledger = orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();
    assert_eq!(ledger.transactions.len(), 20);
    assert!(ledger.transactions.iter().all(|tx| tx.from.is_some()));
    // each decode resolves both sides together
    let peak = metadata.in_flight.peak();
    assert!(peak <= 3 * 2, "peak {}", peak);
    assert!(peak > 2, "decodes never overlapped");
}

#[tokio::test]
async fn test_pricing_respects_concurrency_limit() {
    let tokens: Vec<String> = (0x50u8..0x5a).map(|b| format!("0x{}", hex::encode([b; 20]))).collect();
    let normal_rows = tokens
        .iter()
        .enumerate()
        .map(|(i, _)| normal(&format!("0xe{:02x}", i), 100 + i as i64, ROUTER, "0", true, "0x"))
        .collect();
    let token_rows = tokens
        .iter()
        .enumerate()
        .flat_map(|(i, token)| {
            let hash = format!("0xe{:02x}", i);
            vec![
                transfer(&hash, ALPHA, "ALPHA", WALLET, ROUTER, &wei(1)),
                transfer(&hash, token, "NEW", ROUTER, WALLET, &wei(1)),
            ]
        })
        .collect();
    let prices = Arc::new(SlowPrices::default());
    let settings = LedgerSettings {
        price_concurrency: 2,
        ..LedgerSettings::default()
    };
    let orchestrator = LedgerOrchestrator::new(
        Arc::new(FakeSource::new(normal_rows, vec![], token_rows)),
        Arc::new(FakeMetadata::default()),
        prices.clone(),
        tracked(),
        settings,
    );

    let report = orchestrator.build_report(&addr(WALLET), BlockRange::default()).await.unwrap();
    // ten new tokens, ALPHA and the gas bucket
    assert_eq!(report.token_summaries.len(), 12);
    assert_eq!(prices.in_flight.peak(), 2);
}

#[tokio::test]
async fn test_unreadable_rows_are_not_defaulted() {
    let mut call = normal("0xf1", 0, ROUTER, "0", true, "0x");
    if let RawTransaction::Normal(tx) = &mut call {
        tx.time_stamp = "soon".to_string();
    }
    let mut sold = transfer("0xf1", ALPHA, "ALPHA", WALLET, ROUTER, &wei(5));
    if let RawTransaction::TokenTransfer(row) = &mut sold {
        row.token_decimal = String::new();
    }
    let source = FakeSource::new(
        vec![call],
        vec![],
        vec![sold, transfer("0xf1", BETA, "BETA", ROUTER, WALLET, &wei(3))],
    );
    let h = harness(source, LedgerSettings::default());
    let ledger = h.orchestrator.reconcile(&addr(WALLET), BlockRange::default()).await.unwrap();

    let tx = &ledger.transactions[0];
    assert_eq!(tx.timestamp, 0);
    assert_eq!(tx.from, None);
    assert_eq!(tx.to.as_ref().unwrap().amount, 3.0);
}
