//! stopcount - stop times counter for Prague public transport stations
//!
//! Downloads the GTFS stop list from the Golemio API, builds the station
//! hierarchy, counts the stop times of every station for a date and merges
//! the totals into a durable multi-date record.
//!
//! Every stage is a subcommand and can be re-run on its own:
//!
//! ```text
//! stopcount download-stations
//! stopcount build-hierarchy
//! stopcount count --date 2020-01-02 [--resume]
//! stopcount aggregate --date 2020-01-02
//! stopcount publish --date 2020-01-02
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stopcount::config::{init_config, resolve_api_token};
use stopcount::services::GolemioClient;
use stopcount::{DataDir, Pipeline};
use stopcount_common::config::{load_toml_config_or_default, resolve_config_path, resolve_data_folder};
use stopcount_common::time::parse_date;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for stopcount
#[derive(Parser, Debug)]
#[command(name = "stopcount")]
#[command(about = "Count stop times per station from the Golemio GTFS API")]
#[command(version)]
struct Args {
    /// Config file (default: $STOPCOUNT_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Folder holding all stage outputs (default: $STOPCOUNT_DATA_FOLDER, then config)
    #[arg(short, long, global = true)]
    data_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every GTFS stop
    DownloadStations,

    /// Build the station hierarchy from the downloaded stops
    BuildHierarchy,

    /// Count stop times of every station for a date
    Count {
        /// Date to count (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,

        /// Skip batches already counted for this date
        #[arg(long)]
        resume: bool,
    },

    /// Sum a date's batch counts into station totals
    Aggregate {
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,
    },

    /// Merge a date's totals into the final record
    Publish {
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,
    },

    /// count, aggregate and publish in one go
    Run {
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,

        #[arg(long)]
        resume: bool,
    },

    /// List the dates present in the final record
    Dates,

    /// Write a default config file
    InitConfig,
}

impl Command {
    fn needs_remote(&self) -> bool {
        matches!(
            self,
            Command::DownloadStations | Command::Count { .. } | Command::Run { .. }
        )
    }
}

fn parse_date_arg(value: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging exists; problems are reported right after
    let config_path = resolve_config_path(args.config.as_deref());
    let (toml_config, config_problem) = load_toml_config_or_default(&config_path);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .init();

    info!(
        "Starting stopcount v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match config_problem {
        Some(e) => warn!("{} - using compiled defaults", e),
        None if config_path.exists() => info!("Config: {}", config_path.display()),
        None => info!("No config file at {}, using defaults", config_path.display()),
    }

    if let Command::InitConfig = args.command {
        init_config(&config_path).context("Failed to write default config")?;
        return Ok(());
    }

    toml_config.golemio.validate().context("Invalid [golemio] config")?;

    let data_folder = resolve_data_folder(args.data_folder.as_deref(), &toml_config);
    info!("Data folder: {}", data_folder.display());

    // Offline stages never reach the remote API and need no token
    let token = if args.command.needs_remote() {
        resolve_api_token(&toml_config)?
    } else {
        String::new()
    };
    let client = Arc::new(
        GolemioClient::new(&toml_config.golemio, token).context("Failed to create API client")?,
    );
    let pipeline = Pipeline::new(
        DataDir::new(data_folder),
        client.clone(),
        client,
        &toml_config.golemio,
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    match args.command {
        Command::DownloadStations => {
            pipeline
                .download_stations()
                .await
                .context("download-stations failed")?;
        }
        Command::BuildHierarchy => {
            pipeline
                .build_hierarchy()
                .await
                .context("build-hierarchy failed")?;
        }
        Command::Count { date, resume } => {
            let summary = pipeline
                .count(date, resume, &cancel)
                .await
                .context("count failed")?;
            if summary.is_degraded() {
                warn!(batches = ?summary.degraded_batches, "Some batches are under-counted");
            }
        }
        Command::Aggregate { date } => {
            pipeline.aggregate(date).await.context("aggregate failed")?;
        }
        Command::Publish { date } => {
            pipeline.publish(date).await.context("publish failed")?;
        }
        Command::Run { date, resume } => {
            let summary = pipeline
                .run(date, resume, &cancel)
                .await
                .context("run failed")?;
            if summary.is_degraded() {
                warn!(batches = ?summary.degraded_batches, "Some batches are under-counted");
            }
        }
        Command::Dates => {
            for date in pipeline.recorded_dates().context("Failed to read final record")? {
                println!("{}", date);
            }
        }
        Command::InitConfig => {}
    }

    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn cancel_on_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping at the next wave boundary");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping at the next wave boundary");
        },
    }

    token.cancel();
}
