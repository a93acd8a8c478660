//! findex - directory full-text search, kept in sync
//!
//! Entry point for the findex daemon and the one-shot query frontend.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use clap::{Parser, Subcommand};
use findex::index::open_current;
use findex::observability::init_tracing;
use findex::sync::SyncController;
use findex::{Config, Result};
use tokio_util::sync::CancellationToken;

/// findex - full-text search over a directory tree
#[derive(Parser, Debug)]
#[command(name = "findex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Index storage directory
    #[arg(
        short,
        long,
        env = "FINDEX_INDEX_DIR",
        default_value = "./findex-index"
    )]
    index_dir: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FINDEX_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "FINDEX_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the index and keep it in sync until interrupted
    Run {
        /// Directory to index and watch
        #[arg(short, long, env = "FINDEX_ROOT", default_value = ".")]
        root: std::path::PathBuf,

        /// Debounce window for filesystem events, in milliseconds
        #[arg(long, env = "FINDEX_DEBOUNCE_MS", default_value = "100")]
        debounce_ms: u64,
    },
    /// Query the last committed index generation
    Query {
        /// Query text
        text: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Command::Run { root, debounce_ms } => {
            let config = Config {
                root_dir: root,
                index_dir: cli.index_dir,
                debounce_ms,
                log_level: cli.log_level,
                log_json: cli.log_json,
                ..Default::default()
            };
            config.validate()?;

            tracing::info!(
                "findex v{} indexing {:?} into {:?}",
                env!("CARGO_PKG_VERSION"),
                config.root_dir,
                config.index_dir
            );

            run_daemon(&config).await
        }
        Command::Query { text, limit, json } => query_once(&cli.index_dir, &text, limit, json),
    }
}

/// Run the sync controller until Ctrl-C.
async fn run_daemon(config: &Config) -> Result<()> {
    let controller = SyncController::new(config)?;
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal_token.cancel();
        }
    });

    controller.run(shutdown).await;
    Ok(())
}

/// Execute one query against the committed generation and print results.
fn query_once(
    index_dir: &std::path::Path,
    text: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let generation = open_current(index_dir)?;
    let hits = generation.search(text, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits).map_err(|e| {
            findex::Error::internal(format!("cannot serialize results: {e}"))
        })?);
    } else if hits.is_empty() {
        println!("no matches");
    } else {
        for hit in &hits {
            println!("{:.3}\t{}", hit.score, hit.path);
        }
    }

    Ok(())
}
