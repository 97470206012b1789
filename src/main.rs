use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use card_distance_monitor::{
    init_tracing, pipeline_from_config, read_csv_path, write_csv_path, AppConfig,
};

const DEFAULT_OUTPUT_NAME: &str = "analysis_result.csv";

#[derive(Debug, Parser)]
#[command(name = "card-distance-monitor")]
#[command(about = "Annotate card transactions with merchant-to-home distances")]
struct Cli {
    /// Transaction table to analyze (CSV with a header row)
    input: PathBuf,

    /// Where to write the annotated table; defaults to analysis_result.csv next to the input
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override DISTANCE_THRESHOLD_KM
    #[arg(long)]
    threshold_km: Option<f64>,

    /// Override GEOCODER_MIN_INTERVAL_MS
    #[arg(long)]
    min_interval_ms: Option<u64>,

    /// Skip TLS certificate validation for the geocoder
    #[arg(long)]
    accept_invalid_certs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(threshold) = cli.threshold_km {
        anyhow::ensure!(
            threshold.is_finite() && threshold >= 0.0,
            "threshold must be a non-negative number"
        );
        config.distance_threshold_km = threshold;
    }
    if let Some(interval) = cli.min_interval_ms {
        config.geocoder_min_interval_ms = interval;
    }
    config.geocoder_accept_invalid_certs |= cli.accept_invalid_certs;
    info!(config = ?config.public_profile(), "configuration loaded");

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input));

    let table = read_csv_path(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let pipeline = pipeline_from_config(&config)?;

    let cancel_flag = Arc::new(AtomicBool::new(false));
    {
        let cancel_flag = Arc::clone(&cancel_flag);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping after the current row");
                cancel_flag.store(true, Ordering::SeqCst);
            }
        });
    }

    let result = pipeline
        .process_with(table, None, Some(cancel_flag))
        .await
        .context("distance annotation did not complete; no output written")?;

    write_csv_path(&result.table, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        output = %output.display(),
        stats = ?result.stats,
        "analysis written"
    );
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(DEFAULT_OUTPUT_NAME)
}
