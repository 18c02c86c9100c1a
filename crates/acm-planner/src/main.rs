//! ACM Planning CLI
//!
//! Runs MODCOD selection over a batch of C/No passes.
//!
//! Usage:
//!   acm-plan --passes data/passes.json \
//!            --config data/acm_config.json \
//!            --output data/acm_plan.json

use acm_planner::{loader, report};
use anyhow::Result;
use clap::Parser;
use link_adaptation::{AcmConfig, LinkAdaptationEngine, PassDriver};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    name = "acm-plan",
    about = "Select ACM MODCODs over satellite pass C/No time series"
)]
struct Args {
    /// Path to passes JSON file
    #[arg(short, long, default_value = "data/passes.json")]
    passes: PathBuf,

    /// Path to ACM configuration JSON file (defaults used if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON file
    #[arg(short, long, default_value = "data/acm_plan.json")]
    output: PathBuf,

    /// Worker threads (0 = available parallelism)
    #[arg(short, long, default_value_t = 0)]
    workers: usize,

    /// Write only per-pass summaries, not per-sample decisions
    #[arg(long)]
    summary_only: bool,

    /// Override upgrade hysteresis (dB)
    #[arg(long)]
    upgrade_db: Option<f64>,

    /// Override downgrade hysteresis (dB)
    #[arg(long)]
    downgrade_db: Option<f64>,

    /// Override minimum dwell before upgrade (s)
    #[arg(long)]
    dwell_s: Option<f64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins when set
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level);
    match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())?,
        Err(_) => tracing::subscriber::set_global_default(builder.finish())?,
    }

    info!("{}", "=".repeat(60));
    info!("SX9-Orbital ACM Planner");
    info!("{}", "=".repeat(60));

    let mut config = match &args.config {
        Some(path) => loader::load_config(path)?,
        None => AcmConfig::default(),
    };
    if let Some(db) = args.upgrade_db {
        config.upgrade_hysteresis_db = db;
    }
    if let Some(db) = args.downgrade_db {
        config.downgrade_hysteresis_db = db;
    }
    if let Some(s) = args.dwell_s {
        config.min_dwell_s = s;
    }

    let engine = LinkAdaptationEngine::from_config(&config)?;
    info!(
        "Grid: {} MODCODs over {:.1} MHz (α={}), fallback {}",
        engine.grid().len(),
        config.bandwidth_hz / 1e6,
        config.roll_off,
        engine.grid().fallback().label()
    );
    info!(
        "Hysteresis: +{:.2} dB up / -{:.2} dB down, dwell {:.1} s",
        config.upgrade_hysteresis_db, config.downgrade_hysteresis_db, config.min_dwell_s
    );

    let passes = loader::load_passes(&args.passes)?;
    let outcomes = PassDriver::new(&engine).run_all(&passes, args.workers);

    // Per-pass table
    info!("\n{:24} | {:>6} | {:>4} | {:>4} | {:>6} | {:>10}", "pass", "n", "up", "down", "forced", "mean Mbps");
    for o in &outcomes {
        let s = &o.summary;
        info!(
            "{:24} | {:>6} | {:>4} | {:>4} | {:>6} | {:>10.1}",
            s.pass_id.chars().take(24).collect::<String>(),
            s.samples,
            s.upgrades,
            s.downgrades,
            s.forced_samples,
            s.mean_info_bit_rate_bps / 1e6
        );
    }

    let plan = report::build_report(&config, outcomes, args.summary_only);
    report::write_report(&plan, &args.output)?;

    // Summary
    info!("\n{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Passes: {}", plan.metadata.total_passes);
    info!("Samples: {}", plan.metadata.total_samples);
    info!("Forced samples: {}", plan.metadata.total_forced_samples);
    info!("Delivered: {:.2} Gbit", plan.metadata.total_delivered_bits / 1e9);

    Ok(())
}
