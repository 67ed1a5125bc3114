use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use config_manager::SystemConfig;
use dex_client::{PriceFetchingService, RpcTokenReader, TokenMetadataService};
use explorer_client::{ExplorerClient, ExplorerClientConfig, TrackedTokenClient, TrackedTokenSourceConfig};
use job_orchestrator::{parse_wallet, LedgerOrchestrator, LedgerSettings};
use ledger_core::{filter_transactions, BlockRange, TrackedTokenList, TransactionView, TtlCache};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "alpha-ledger")]
#[command(about = "Reconcile a BNB Smart Chain wallet's aggregator swaps into a priced ledger", long_about = None)]
struct Cli {
    /// Configuration file; missing files fall back to defaults and LEDGER__* variables
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the wallet report and print it as JSON
    Report {
        /// Wallet address
        address: String,

        #[arg(long)]
        start_block: Option<u64>,

        #[arg(long)]
        end_block: Option<u64>,

        /// Start from the block closest before this time (unix seconds or RFC 3339)
        #[arg(long, conflicts_with = "start_block")]
        since: Option<String>,

        /// all, buy or sell
        #[arg(long, default_value = "all")]
        view: String,

        /// Include failed transactions in the listing
        #[arg(long)]
        show_failed: bool,
    },
    /// Resolve a unix timestamp to the closest block before it
    Block { timestamp: i64 },
    /// Download the tracked-token list and save it locally
    RefreshTokens,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_since(raw: &str) -> Result<i64> {
    if let Ok(seconds) = raw.trim().parse::<i64>() {
        return Ok(seconds);
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.timestamp())
        .map_err(|e| anyhow!("--since expects unix seconds or RFC 3339, got '{}': {}", raw, e))
}

fn load_tracked(config: &SystemConfig) -> TrackedTokenList {
    match TrackedTokenList::load_from_file(&config.ledger.tracked_tokens_path) {
        Ok(list) => list,
        Err(e) => {
            warn!(
                "⚠️ No usable tracked-token list ({}); run `alpha-ledger refresh-tokens`",
                e
            );
            TrackedTokenList::default()
        }
    }
}

fn build_orchestrator(
    config: &SystemConfig,
    explorer: Arc<ExplorerClient>,
    tracked: Arc<TrackedTokenList>,
) -> Result<LedgerOrchestrator> {
    let reader = RpcTokenReader::new(&config.rpc.url, Duration::from_secs(config.rpc.request_timeout_seconds))?;
    let metadata = TokenMetadataService::new(
        tracked.clone(),
        Arc::new(reader),
        Arc::new(TtlCache::new(Duration::from_secs(config.ledger.metadata_cache_ttl_seconds))),
    );
    let prices = PriceFetchingService::new(&config.prices)?;
    let settings = LedgerSettings::from_config(config)?;

    Ok(LedgerOrchestrator::new(
        explorer,
        Arc::new(metadata),
        Arc::new(prices),
        tracked,
        settings,
    ))
}

async fn run_report(
    config: &SystemConfig,
    address: &str,
    start_block: Option<u64>,
    end_block: Option<u64>,
    since: Option<String>,
    view: &str,
    show_failed: bool,
) -> Result<()> {
    let wallet = parse_wallet(address)?;
    let view: TransactionView = view.parse().map_err(|e: String| anyhow!(e))?;
    let explorer = Arc::new(ExplorerClient::with_config(ExplorerClientConfig::from(&config.explorer))?);

    let start_block = match since {
        Some(raw) => {
            let timestamp = parse_since(&raw)?;
            let block = explorer.get_block_number_by_timestamp(timestamp).await?;
            info!("🕒 {} resolves to block {}", timestamp, block);
            block
        }
        None => start_block.unwrap_or(0),
    };
    let range = BlockRange::new(start_block, end_block.unwrap_or(BlockRange::LATEST));

    let tracked = Arc::new(load_tracked(config));
    let orchestrator = build_orchestrator(config, explorer, tracked.clone())?;
    let report = orchestrator
        .build_report(&wallet, range)
        .await
        .with_context(|| format!("failed to build report for {}", address))?;

    let listed = filter_transactions(&report.transactions, &tracked, view, show_failed);
    let mut output = serde_json::to_value(&report)?;
    output["transactions"] = serde_json::to_value(&listed)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = SystemConfig::load_from_path(&cli.config)?;
    info!("Configuration loaded");

    match cli.command {
        Command::Report {
            address,
            start_block,
            end_block,
            since,
            view,
            show_failed,
        } => run_report(&config, &address, start_block, end_block, since, &view, show_failed).await?,
        Command::Block { timestamp } => {
            let explorer = ExplorerClient::with_config(ExplorerClientConfig::from(&config.explorer))?;
            let block = explorer.get_block_number_by_timestamp(timestamp).await?;
            println!("{}", block);
        }
        Command::RefreshTokens => {
            let client = TrackedTokenClient::with_config(TrackedTokenSourceConfig::from(&config))?;
            let list = client.refresh_to_file(&config.ledger.tracked_tokens_path).await?;
            println!("{} tracked tokens written to {}", list.len(), config.ledger.tracked_tokens_path);
        }
    }

    Ok(())
}
