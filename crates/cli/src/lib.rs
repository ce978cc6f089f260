//! CLI for echobench.
//!
//! This crate provides the command-line interface: building the servers,
//! running sweeps, rendering charts from stored records, and showing the
//! effective configuration.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod settings;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use echobench_benchmarks::chart::ChartSpec;
use echobench_benchmarks::record::Scalar;
use echobench_benchmarks::target::validate_targets;
use echobench_benchmarks::{io, setup, BenchConfig, BenchError, RecordStore, ReportRenderer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// echobench: io_uring vs epoll echo server benchmark harness.
#[derive(Parser, Debug)]
#[command(name = "echobench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, global = true, env = "ECHOBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose (debug) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured build steps.
    Setup,

    /// Build the servers, run the sweep, and write the record file.
    ///
    /// Records go to `<record_dir>/records_<stamp>.json` with a markdown
    /// summary alongside.
    Run {
        /// Concurrent client counts, comma separated.
        #[arg(long, value_delimiter = ',')]
        concurrency: Option<Vec<u32>>,

        /// Message lengths in bytes, comma separated.
        #[arg(long, value_delimiter = ',')]
        payload: Option<Vec<u32>>,

        /// Seconds per trial.
        #[arg(long)]
        duration: Option<u32>,

        /// Record directory override.
        #[arg(long)]
        records_dir: Option<PathBuf>,

        /// Do not run the build steps first.
        #[arg(long)]
        skip_setup: bool,
    },

    /// Render a chart from the latest record file.
    Report {
        /// Record directory override.
        #[arg(long)]
        records_dir: Option<PathBuf>,

        /// Chart directory override.
        #[arg(long)]
        img_dir: Option<PathBuf>,

        /// Field on the x axis.
        #[arg(long, default_value = "client_number")]
        x: String,

        /// Field on the y axis.
        #[arg(long, default_value = "request_per_second")]
        y: String,

        /// Attribute splitting records into series.
        #[arg(long, default_value = "target")]
        series: String,

        /// Only plot records where `key=value`; repeatable.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, Scalar)>,
    },

    /// Show the effective configuration and the latest record file.
    Status,
}

fn parse_filter(raw: &str) -> std::result::Result<(String, Scalar), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), Scalar::parse_loose(value)))
}

/// Install the global tracing subscriber.
pub fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(err) = result {
        eprintln!("tracing already initialised: {err}");
    }
}

/// Run the CLI with the process arguments.
///
/// # Returns
///
/// Returns `Ok(())` on success, or an error if the command fails.
pub fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);
    execute(cli)
}

/// Execute parsed arguments.
pub fn execute(cli: Cli) -> Result<()> {
    let mut config = settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Setup => {
            let outcomes = setup::run_setup(&config.setup).context("setup failed")?;
            println!("Completed {} build steps", outcomes.len());
            Ok(())
        }
        Commands::Run {
            concurrency,
            payload,
            duration,
            records_dir,
            skip_setup,
        } => {
            if let Some(concurrency) = concurrency {
                config.sweep.concurrency = concurrency;
            }
            if let Some(payload) = payload {
                config.sweep.payload_sizes = payload;
            }
            if let Some(duration) = duration {
                config.sweep.duration_seconds = duration;
            }
            if let Some(dir) = records_dir {
                config.output.record_dir = dir;
            }
            run_sweep(&config, skip_setup)
        }
        Commands::Report {
            records_dir,
            img_dir,
            x,
            y,
            series,
            filters,
        } => {
            let renderer = ReportRenderer::new(
                records_dir.unwrap_or(config.output.record_dir),
                img_dir.unwrap_or(config.output.img_dir),
            );
            let spec = ChartSpec {
                x_key: x,
                y_key: y,
                series_key: (!series.is_empty()).then_some(series),
                filters,
                ..ChartSpec::default()
            };
            let path = renderer.render_latest(&spec).context("failed to render report")?;
            println!("Chart written to {}", path.display());
            Ok(())
        }
        Commands::Status => {
            print_status(&config);
            Ok(())
        }
    }
}

fn run_sweep(config: &BenchConfig, skip_setup: bool) -> Result<()> {
    let plan = config.sweep.plan()?;
    validate_targets(&config.targets, &echobench_core::allowed_cpus())?;

    if !skip_setup {
        info!(steps = config.setup.len(), "running build steps");
        setup::run_setup(&config.setup).context("setup failed")?;
    }

    let store = RecordStore::new(&config.output.record_dir);
    let outcome = echobench_benchmarks::controller_for(config)
        .run_and_persist(&plan, &store)
        .context("benchmark sweep aborted")?;
    let summary = io::write_summary(&outcome.records, &outcome.path)?;

    println!(
        "{} {} trials",
        "Completed".green().bold(),
        outcome.records.len()
    );
    println!("Records written to {}", outcome.path.display());
    println!("Summary written to {}", summary.display());
    Ok(())
}

fn print_status(config: &BenchConfig) {
    println!("{}", "echobench".bold());
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Online CPUs: {}", echobench_core::online_cpus());
    println!("Usable CPUs: {:?}", echobench_core::allowed_cpus());

    println!("\n{}", "Sweep:".bold());
    println!("  concurrency:   {:?}", config.sweep.concurrency);
    println!("  payload sizes: {:?}", config.sweep.payload_sizes);
    println!("  duration:      {}s", config.sweep.duration_seconds);
    println!("  address:       {}", config.trial.address());

    println!("\n{}", "Targets:".bold());
    for target in &config.targets {
        println!(
            "  - {} on cpu {}: {}",
            target.name,
            target.cpu,
            target.command_for(config.trial.port)
        );
    }

    println!("\n{}", "Output:".bold());
    println!("  records: {}", config.output.record_dir.display());
    println!("  charts:  {}", config.output.img_dir.display());
    match io::latest_path(&config.output.record_dir) {
        Ok(path) => println!("  latest:  {}", path.display()),
        Err(BenchError::NoReportFound { .. }) => println!("  latest:  {}", "none".dimmed()),
        Err(err) => println!("  latest:  {}", err.to_string().red()),
    }
}
