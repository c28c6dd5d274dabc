//! CLI entry point for candlevault.
//!
//! Subcommands:
//!   - `bootstrap` — full historical backfill for every configured series
//!   - `update`    — incremental catch-up from the stored tail
//!   - `verify`    — read-only integrity report (gaps, null indicator spans)
//!   - `repair`    — targeted re-ingest of detected defects
//!   - `query`     — print stored rows for one series as JSON lines

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use rustc_hash::FxHashSet;
use tracing_subscriber::EnvFilter;

use cv_client::{BinanceClient, ClientConfig};
use cv_core::interval::Interval;
use cv_engine::ingest::{self, IngestOutcome};
use cv_engine::repair::repair;
use cv_engine::verify::verify;
use cv_engine::{SeriesSpec, ShutdownFlag};
use cv_store::Store;

use config::AppConfig;

#[derive(Parser)]
#[command(
    name = "candlevault",
    version,
    about = "Deterministic OHLCV candle and indicator store",
    propagate_version = true,
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, default_value = "./config/default.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill every configured series from the configured start date
    Bootstrap {
        /// Fetch and compute, but roll back every write
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Catch each series up to the newest closed bar
    Update {
        /// Fetch and compute, but roll back every write
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Report gaps and null indicator spans without writing anything
    Verify,
    /// Re-ingest detected gaps and recompute null indicator spans
    Repair,
    /// Print candles joined with indicators, newest first, one JSON object per line
    Query {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        interval: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match AppConfig::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[error] {e}");
            std::process::exit(1);
        }
    };

    init_logging(&cfg);

    if let Err(e) = run(cli.command, cfg).await {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

/// One JSON object per line on stdout; `RUST_LOG` overrides the configured
/// level.
fn init_logging(cfg: &AppConfig) {
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.as_filter())),
        )
        .init();
}

async fn run(command: Commands, cfg: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Bootstrap { dry_run } => ingest_all(&cfg, dry_run, true).await,
        Commands::Update { dry_run } => ingest_all(&cfg, dry_run, false).await,
        Commands::Verify => run_verify(&cfg),
        Commands::Repair => run_repair(&cfg).await,
        Commands::Query {
            symbol,
            interval,
            limit,
        } => run_query(&cfg, &symbol, &interval, limit),
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_millis() as i64
}

/// Configured (symbol, interval) pairs in config order, deduplicated.
fn configured_series(cfg: &AppConfig) -> Vec<SeriesSpec> {
    let mut seen: FxHashSet<(String, Interval)> = FxHashSet::default();
    let mut series = Vec::new();
    for symbol in &cfg.symbols {
        for &interval in &cfg.intervals {
            if seen.insert((symbol.clone(), interval)) {
                series.push(SeriesSpec {
                    symbol: symbol.clone(),
                    interval,
                });
            }
        }
    }
    series
}

fn open_store(cfg: &AppConfig) -> anyhow::Result<Store> {
    if let Some(parent) = cfg.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Store::open(&cfg.db_path)?)
}

/// Watch for SIGINT and flip the flag; the engines stop at the next chunk
/// boundary with the current transaction either committed or rolled back.
fn spawn_interrupt_watcher() -> ShutdownFlag {
    let flag: ShutdownFlag = Arc::new(AtomicBool::new(false));
    let watched = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current chunk");
            watched.store(true, Ordering::Relaxed);
        }
    });
    flag
}

async fn ingest_all(cfg: &AppConfig, dry_run: bool, from_scratch: bool) -> anyhow::Result<()> {
    let mut db = open_store(cfg)?;
    let client = BinanceClient::new(ClientConfig::new(
        cfg.rate_limit.clone(),
        cfg.http.timeout_ms,
    ))?;
    let shutdown = spawn_interrupt_watcher();
    let start_ms = cfg.start_ms();

    let mut total = IngestOutcome::default();
    for spec in configured_series(cfg) {
        tracing::info!(
            symbol = %spec.symbol,
            interval = spec.interval.code(),
            dry_run,
            "ingesting series"
        );
        let outcome = if from_scratch {
            ingest::bootstrap(&client, &mut db, &spec, start_ms, now_ms(), dry_run, &shutdown)
                .await?
        } else {
            ingest::update(&client, &mut db, &spec, start_ms, now_ms(), dry_run, &shutdown)
                .await?
        };
        total.candles_written += outcome.candles_written;
        total.indicator_rows_written += outcome.indicator_rows_written;
        total.chunks += outcome.chunks;
    }

    tracing::info!(
        candles = total.candles_written,
        indicator_rows = total.indicator_rows_written,
        chunks = total.chunks,
        dry_run,
        "ingest finished"
    );
    Ok(())
}

fn run_verify(cfg: &AppConfig) -> anyhow::Result<()> {
    let db = open_store(cfg)?;
    let report = verify(&db, &configured_series(cfg))?;
    if report.clean() {
        tracing::info!("store is clean");
    } else {
        tracing::warn!("store has integrity findings");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_repair(cfg: &AppConfig) -> anyhow::Result<()> {
    let mut db = open_store(cfg)?;
    let client = BinanceClient::new(ClientConfig::new(
        cfg.rate_limit.clone(),
        cfg.http.timeout_ms,
    ))?;
    let shutdown = spawn_interrupt_watcher();

    let summary = repair(&client, &mut db, &configured_series(cfg), now_ms(), &shutdown).await?;
    if summary.clean() {
        tracing::info!("repair left no detectable defects");
    } else {
        tracing::warn!("defects remain; register known gaps for windows with no market data");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_query(cfg: &AppConfig, symbol: &str, interval: &str, limit: u32) -> anyhow::Result<()> {
    // Reject unknown interval codes before touching the store.
    let interval: Interval = interval.parse()?;
    let db = open_store(cfg)?;
    for row in db.query_rows(symbol, interval.code(), limit)? {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}
