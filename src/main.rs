//! SWAPWATCH: Broker Swap-Rate Collector
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the HTTP sessions, the collection engine and the snapshot store, then
//! runs one collection per interval (or just one with `--once`) with
//! graceful shutdown.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};

use swapwatch::config;
use swapwatch::engine::cycle::{run_cycle, CycleContext, RunReport};
use swapwatch::engine::orchestrator::CollectionOrchestrator;
use swapwatch::report;
use swapwatch::sources::http::HttpSessionFactory;
use swapwatch::storage::JsonSnapshotWriter;

const BANNER: &str = r#"
 ____ _      __  ___    ___  _      __  ___   ______ _____ __ __
/ __/| | /| / / / _ |  / _ \| | /| / / / _ | /_  __// ___// // /
_\ \ | |/ |/ / / __ | / ___/| |/ |/ / / __ |  / /  / /__ / _  /
/___/ |__/|__/ /_/ |_|/_/    |__/|__/ /_/ |_| /_/   \___//_//_/

  Broker swap-rate collector
  v0.1.0
"#;

#[derive(Parser, Debug)]
#[command(name = "swapwatch")]
#[command(about = "Collect broker swap rates into a dated, canonically ordered snapshot")]
struct Args {
    /// Path to the TOML configuration
    #[arg(long, env = "SWAPWATCH_CONFIG", default_value = "config.toml")]
    config: String,

    /// Run a single collection and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = Args::parse();

    // Load configuration from TOML
    let cfg = config::AppConfig::load(&args.config)?;

    // Initialise structured logging
    init_logging();

    println!("{BANNER}");

    // Configuration problems are fatal before anything is fetched.
    let canonical = cfg.validate()?;

    info!(
        collector = %cfg.collector.name,
        sources = cfg.sources.len(),
        canonical = canonical.symbols().len(),
        parallel = cfg.collector.parallel_sources,
        snapshot_dir = %cfg.storage.snapshot_dir,
        "SWAPWATCH starting up"
    );

    // -- Initialise components -------------------------------------------

    let sessions = HttpSessionFactory::new(cfg.page_load_timeout(), cfg.collector.user_agent.clone());
    let fingerprinter = cfg.collector.fingerprint.build();
    let orchestrator =
        CollectionOrchestrator::new(&sessions, fingerprinter.as_ref(), cfg.collection_settings());
    let writer = JsonSnapshotWriter::new(Some(&cfg.storage.snapshot_dir));

    let ctx = CycleContext {
        orchestrator: &orchestrator,
        sources: &cfg.sources,
        canonical: &canonical,
        placeholder: &cfg.collector.placeholder,
        writer: &writer,
    };

    if args.once {
        let report = run_cycle(&ctx, Local::now().date_naive()).await;
        print_run(&report);
        return Ok(());
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.collector.interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.collector.interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let mut runs = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = run_cycle(&ctx, Local::now().date_naive()).await;
                print_run(&report);
                runs += 1;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(runs, "SWAPWATCH shut down cleanly.");
    Ok(())
}

/// Print the reconciled table, the per-source summary and any new-symbol
/// banner to the console.
fn print_run(report: &RunReport) {
    println!("\n{}", report::render_table(&report.snapshot.rows));
    println!("{}", report::render_sources(&report.sources));
    if !report.snapshot.novel.is_empty() {
        println!("{}", report::novel_banner(&report.snapshot.novel));
    }
    if !report.persisted() {
        warn!(
            snapshot_id = %report.snapshot.id,
            "Snapshot only printed; storage write failed"
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("swapwatch=info"));

    let json_logging = std::env::var("SWAPWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
