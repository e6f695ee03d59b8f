//! QuoteLab CLI: offline access to the market-data pipeline over CSV bars.
//!
//! Commands:
//! - `trend`: compute the adaptive SuperTrend series and signals
//! - `aggregate`: re-bucket bars to a coarser interval in a time zone
//! - `filter`: keep bars inside a trading session
//! - `sessions`: list the built-in session presets
//!
//! Bar CSVs have a header `timestamp,open,high,low,close,volume` with RFC 3339
//! timestamps. Results go to stdout; logs go to stderr (`RUST_LOG`).

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use quotelab_core::aggregate::aggregate;
use quotelab_core::config::PipelineConfig;
use quotelab_core::domain::Bar;
use quotelab_core::time::{filter_by_session, Interval, Session};
use quotelab_core::trend::{compute_adaptive_trend, ClusterLabel};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "quotelab",
    about = "QuoteLab CLI: bar aggregation, session filters and adaptive SuperTrend"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the adaptive trend series for a CSV of bars.
    Trend {
        /// Input CSV of bars.
        input: PathBuf,

        /// TOML config; its [trend] section supplies the engine options.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cluster to take the factor from: best, average or worst.
        #[arg(long)]
        from_cluster: Option<ClusterLabel>,

        /// Seed for k-means reseeding.
        #[arg(long)]
        seed: Option<u64>,

        /// Print signals instead of the per-bar series.
        #[arg(long, default_value_t = false)]
        signals: bool,

        #[arg(long, value_enum, default_value = "csv")]
        format: OutputFormat,
    },
    /// Re-bucket bars to a coarser interval.
    Aggregate {
        /// Input CSV of bars.
        input: PathBuf,

        /// Target interval (1m, 5m, 10m, 15m, 30m, 1h, 4h, 1d, or vendor tokens like 60, D).
        #[arg(long)]
        interval: Interval,

        /// IANA time zone for bucket boundaries.
        #[arg(long, default_value = "America/New_York")]
        timezone: String,
    },
    /// Keep only bars inside a trading session.
    Filter {
        /// Input CSV of bars.
        input: PathBuf,

        /// Session preset: regular, extended, futures, crypto.
        #[arg(long, default_value = "regular")]
        session: String,
    },
    /// List built-in session presets.
    Sessions,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Trend {
            input,
            config,
            from_cluster,
            seed,
            signals,
            format,
        } => run_trend(&input, config.as_deref(), from_cluster, seed, signals, format),
        Commands::Aggregate {
            input,
            interval,
            timezone,
        } => run_aggregate(&input, interval, &timezone),
        Commands::Filter { input, session } => run_filter(&input, &session),
        Commands::Sessions => run_sessions(),
    }
}

fn run_trend(
    input: &Path,
    config_path: Option<&Path>,
    from_cluster: Option<ClusterLabel>,
    seed: Option<u64>,
    signals_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = match config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let mut options = config.trend;
    if let Some(label) = from_cluster {
        options.from_cluster = label;
    }
    if seed.is_some() {
        options.seed = seed;
    }

    let bars = read_bars(input)?;
    let result = compute_adaptive_trend(&bars, &options);
    let d = &result.diagnostics;
    tracing::info!(
        bars = bars.len(),
        target_factor = d.target_factor,
        cluster = %d.used_cluster,
        performance_index = d.performance_index,
        signals = result.signals.len(),
        "adaptive trend"
    );
    for warning in &d.warnings {
        tracing::warn!(?warning, "degenerate input");
    }

    match (format, signals_only) {
        (OutputFormat::Json, false) => write_json(&result),
        (OutputFormat::Json, true) => write_json(&result.signals),
        (OutputFormat::Csv, false) => write_csv(&result.series),
        (OutputFormat::Csv, true) => write_csv(&result.signals),
    }
}

fn run_aggregate(input: &Path, interval: Interval, timezone: &str) -> Result<()> {
    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => bail!("unknown time zone '{timezone}'"),
    };
    let bars = read_bars(input)?;
    let out = aggregate(&bars, interval, tz);
    tracing::info!(input = bars.len(), output = out.len(), %interval, "aggregated");
    write_csv(&out)
}

fn run_filter(input: &Path, session_name: &str) -> Result<()> {
    let session = Session::from_name(session_name)?;
    let bars = read_bars(input)?;
    let kept = filter_by_session(&bars, &session);
    tracing::info!(input = bars.len(), kept = kept.len(), session = %session.name, "filtered");
    write_csv(&kept)
}

fn run_sessions() -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{:<10} {:<18} Windows", "Name", "Time zone")?;
    writeln!(out, "{}", "-".repeat(48))?;
    for name in ["regular", "extended", "futures", "crypto"] {
        let session = Session::from_name(name)?;
        let windows: Vec<String> = session
            .windows
            .iter()
            .map(|w| format!("{}-{}", w.start.format("%H:%M"), w.end.format("%H:%M")))
            .collect();
        writeln!(out, "{:<10} {:<18} {}", name, session.timezone.name(), windows.join(", "))?;
    }
    Ok(())
}

fn read_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut bars = Vec::new();
    for (line, record) in reader.deserialize::<Bar>().enumerate() {
        let bar = record.with_context(|| format!("{}: bad record {}", path.display(), line + 1))?;
        bars.push(bar);
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

fn write_csv<T: Serialize>(rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout().lock());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
