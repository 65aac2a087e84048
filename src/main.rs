use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memewatch::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "memewatch",
    version,
    about = "Track celebrity and memecoin chatter in social-media datasets",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); MEMEWATCH_* environment variables otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a dataset of posts (JSON Lines or JSON array)
    Ingest {
        /// Dataset file
        dataset: PathBuf,

        /// Number of concurrent post workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip records consumed by an earlier run
        #[arg(long, default_value = "false")]
        resume: bool,

        /// Write Prometheus metrics to this file when done
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },

    /// Manage tracked celebrities and keywords
    Track {
        #[command(subcommand)]
        action: TrackAction,
    },

    /// Show aggregate windows of an entity
    Windows {
        /// Entity id: `@username` for a celebrity, plain text for a keyword
        entity: String,

        /// Start of the time range (RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// End of the time range, exclusive (RFC 3339)
        #[arg(long)]
        until: Option<String>,
    },

    /// Show trend signals
    Trends {
        /// Only this entity, all of its windows
        #[arg(short, long)]
        entity: Option<String>,

        /// Number of entities in the top-trending ranking
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print dataset statistics
    Stats {
        /// Start of the time range (RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// End of the time range, exclusive (RFC 3339)
        #[arg(long)]
        until: Option<String>,

        /// Number of keywords to list
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Score the sentiment of a piece of text
    Score {
        /// Text to score
        text: String,
    },
}

#[derive(Subcommand)]
enum TrackAction {
    /// Start tracking an entity
    Add {
        /// Entity kind (celebrity, keyword)
        kind: String,

        /// Username or keyword
        id: String,
    },

    /// Stop tracking an entity
    Remove {
        /// Entity id: `@username` for a celebrity, plain text for a keyword
        id: String,
    },

    /// List tracked entities
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::debug!(config = ?cli.config, "memewatch starting");

    match cli.command {
        Commands::Ingest {
            dataset,
            workers,
            resume,
            metrics_out,
        } => {
            tracing::info!(
                dataset = %dataset.display(),
                workers = ?workers,
                resume,
                "Starting ingest command"
            );
            commands::ingest(config, dataset, workers, resume, metrics_out).await?;
        }

        Commands::Track { action } => match action {
            TrackAction::Add { kind, id } => commands::track_add(&config, &kind, &id)?,
            TrackAction::Remove { id } => commands::track_remove(&config, &id)?,
            TrackAction::List => commands::track_list(&config)?,
        },

        Commands::Windows {
            entity,
            since,
            until,
        } => {
            commands::windows(&config, &entity, since.as_deref(), until.as_deref())?;
        }

        Commands::Trends { entity, limit } => {
            commands::trends(&config, entity.as_deref(), limit)?;
        }

        Commands::Stats { since, until, top } => {
            commands::stats(&config, since.as_deref(), until.as_deref(), top)?;
        }

        Commands::Score { text } => {
            commands::score(&config, &text);
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "memewatch=debug,info".to_string()
    } else {
        format!("memewatch={level},warn")
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
