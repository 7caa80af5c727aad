//! Ethereum Block Scanner CLI
//!
//! Scans a block range and writes the value-bearing transactions of each
//! block to its own file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use eth_block_scanner::config::{OutputFormat, PipelineConfig};
use eth_block_scanner::pipeline::PipelineCoordinator;
use eth_block_scanner::range::{parse_block_number, BlockRange};
use eth_block_scanner::rpc::EthRpcClient;
use eth_block_scanner::schemas::{BlockNumber, RunMetadata};
use eth_block_scanner::sink::{scan_artifacts, BlockFileSink};

const METADATA_FILE: &str = "run_metadata.json";
const MISSING_REPORT_LIMIT: usize = 10;

#[derive(Parser)]
#[command(name = "eth-block-scanner")]
#[command(version)]
#[command(about = "Concurrent Ethereum block range scanner", long_about = None)]
struct Cli {
    /// Path to configuration file (optional, uses env vars if not provided)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output directory for block files (overrides config)
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// JSON-RPC endpoint (overrides config and LEDGER_RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a block range and write one file per block
    Scan {
        /// First block (decimal or 0x-prefixed hex)
        #[arg(short, long, default_value = "12000000", value_parser = parse_block_number)]
        start: BlockNumber,

        /// Last block, inclusive
        #[arg(short, long, default_value = "14000000", value_parser = parse_block_number)]
        end: BlockNumber,

        /// Maximum number of blocks processed at once
        #[arg(short = 'n', long, visible_alias = "routines")]
        concurrency: Option<usize>,

        /// Output encoding
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Show which blocks of a range have been written
    Status {
        /// First block (decimal or 0x-prefixed hex)
        #[arg(short, long, default_value = "12000000", value_parser = parse_block_number)]
        start: BlockNumber,

        /// Last block, inclusive
        #[arg(short, long, default_value = "14000000", value_parser = parse_block_number)]
        end: BlockNumber,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PipelineConfig::load().context("Failed to load config from environment")?,
    };

    if let Some(dir) = cli.output_dir {
        config.output.dir = dir;
    }
    if let Some(url) = cli.rpc_url {
        config.rpc.url = url;
    }

    match cli.command {
        Commands::Scan {
            start,
            end,
            concurrency,
            format,
        } => {
            if let Some(concurrency) = concurrency {
                config.scan.concurrency = concurrency;
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            cmd_scan(&config, start, end).await?;
        }
        Commands::Status { start, end } => {
            cmd_status(&config, start, end)?;
        }
    }

    Ok(())
}

async fn cmd_scan(config: &PipelineConfig, start: BlockNumber, end: BlockNumber) -> Result<()> {
    info!("=== Scanning Blocks ===");
    config.validate().context("Invalid configuration")?;

    info!("RPC endpoint: {}", config.rpc.url);
    info!(
        "Output: {:?} ({}), concurrency={}, transaction fan-out={}",
        config.output.dir,
        config.output.format,
        config.scan.concurrency,
        config.scan.transaction_fanout
    );

    let client = Arc::new(EthRpcClient::new(&config.rpc).context("Failed to build RPC client")?);
    let sink = Arc::new(BlockFileSink::new(&config.output.dir, config.output.format));

    let summary = PipelineCoordinator::new(client, sink, &config.scan)
        .run(start, end)
        .await
        .with_context(|| format!("Scan of blocks {} to {} failed", start, end))?;

    // Write metadata
    let mut metadata = RunMetadata::new(start, end, config.output.format);
    metadata.record_counts.blocks = summary.blocks_written;
    metadata.record_counts.transactions = summary.records_written;
    std::fs::create_dir_all(&config.output.dir)?;
    let metadata_path = config.output.dir.join(METADATA_FILE);
    metadata.save(&metadata_path)?;

    info!(
        "Wrote {} blocks ({} transactions) in {:.1?}",
        summary.blocks_written, summary.records_written, summary.elapsed
    );
    info!("Metadata saved to {:?}", metadata_path);

    Ok(())
}

fn cmd_status(config: &PipelineConfig, start: BlockNumber, end: BlockNumber) -> Result<()> {
    info!("=== Scan Status ===");
    info!("Output directory: {:?}", config.output.dir);

    let range = BlockRange::new(start, end)?;

    if !config.output.dir.exists() {
        info!("  ✗ No output directory; nothing scanned yet");
        return Ok(());
    }

    let artifacts = scan_artifacts(&config.output.dir)
        .with_context(|| format!("Failed to list {:?}", config.output.dir))?;
    let mut present = HashSet::new();
    let mut size_bytes = 0u64;
    for artifact in artifacts.iter().filter(|a| range.contains(&a.number)) {
        present.insert(artifact.number);
        size_bytes += std::fs::metadata(&artifact.path).map(|m| m.len()).unwrap_or(0);
    }

    info!(
        "  {} artifacts in directory, {} of {} blocks in range {}..={} present ({} KB)",
        artifacts.len(),
        present.len(),
        range.len(),
        start,
        end,
        size_bytes / 1024
    );

    let missing: Vec<BlockNumber> = range
        .clone()
        .filter(|number| !present.contains(number))
        .take(MISSING_REPORT_LIMIT)
        .collect();
    if missing.is_empty() {
        info!("  ✓ Range complete");
    } else {
        let listed: Vec<String> = missing.iter().map(|n| n.to_string()).collect();
        warn!("  ✗ First missing blocks: {}", listed.join(", "));
    }

    let metadata_path = config.output.dir.join(METADATA_FILE);
    if metadata_path.exists() {
        info!("  ✓ {}", METADATA_FILE);
    } else {
        info!("  ✗ {}", METADATA_FILE);
    }

    Ok(())
}
