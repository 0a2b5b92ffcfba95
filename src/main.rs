//! CLI entry point for the air-quality ELT pipeline.
//!
//! Provides one subcommand per stage, a `run` command that chains them with
//! retries, and a `publish` command that uploads the analytics artifacts to S3.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use airq_elt::config::Config;
use airq_elt::extract::{self, DEFAULT_DAYS, DEFAULT_START, DateRange};
use airq_elt::{load, pipeline, publish, transform, validate};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "airq_elt")]
#[command(about = "Extract, load and transform synthetic air-quality readings", long_about = None)]
struct Cli {
    /// Data directory (overrides AIRQ_DATA_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate synthetic readings into the raw extract CSV
    Extract {
        /// Number of consecutive days to generate
        #[arg(short = 'n', long, default_value_t = DEFAULT_DAYS)]
        days: u32,

        /// First day to generate (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Generate a single day instead of a range (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["days", "start"])]
        date: Option<NaiveDate>,

        /// Base seed (overrides AIRQ_SEED)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Replace the raw table with the extract CSV
    Load,
    /// Rebuild the analytics tables and export artifacts
    Transform,
    /// Check row-count parity and raw-table immutability
    Validate,
    /// Run extract, load, transform and validate with retries
    Run {
        /// Number of consecutive days to generate
        #[arg(short = 'n', long, default_value_t = DEFAULT_DAYS)]
        days: u32,
    },
    /// Upload the analytics artifacts to S3
    Publish {
        /// S3 bucket name to upload to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: String,

        /// Key prefix for uploaded objects
        #[arg(long, default_value = publish::DEFAULT_PREFIX)]
        prefix: String,

        /// Gzip compress artifacts before uploading
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

/// Colored stderr plus a JSON daily-rolling log file.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/airq_elt.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("airq_elt.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(guard)
}

fn default_start() -> Result<NaiveDate> {
    let (y, m, d) = DEFAULT_START;
    NaiveDate::from_ymd_opt(y, m, d).context("invalid default start date")
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _guard = init_tracing()?;
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    config.log_config();

    match cli.command {
        Commands::Extract {
            days,
            start,
            date,
            seed,
        } => {
            let range = match date {
                Some(date) => DateRange::Single(date),
                None => DateRange::Span {
                    start: match start {
                        Some(start) => start,
                        None => default_start()?,
                    },
                    days,
                },
            };
            let seed = seed.unwrap_or(config.seed);
            extract::extract(&config.extract_path(), range, seed)?;
        }
        Commands::Load => {
            load::load(&config)?;
        }
        Commands::Transform => {
            transform::transform(&config)?;
        }
        Commands::Validate => {
            validate::validate(&config)?;
        }
        Commands::Run { days } => {
            let range = DateRange::Span {
                start: default_start()?,
                days,
            };
            let outcome = pipeline::run(&config, range)?;
            info!(
                records = outcome.summary.total_records,
                stations = outcome.summary.total_stations,
                validation_passed = outcome.report.passed(),
                "Run finished"
            );
        }
        Commands::Publish {
            s3_bucket,
            prefix,
            gzip,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(publish::publish(
                &s3_bucket,
                &prefix,
                &config.analytics_dir(),
                gzip,
            ))?;
        }
    }

    Ok(())
}
