//! # ragchat CLI (`rag`)
//!
//! Builds a vector index from a folder of documents and chats over it.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest` | Ingest the data folder into a fresh index and save it |
//! | `rag query "<text>"` | Print the chunks nearest to a query |
//! | `rag chat` | Interactive retrieval-augmented chat |
//! | `rag stats` | Summarize a saved snapshot |
//!
//! Credentials are read from environment variables; a `.env` file in the
//! working directory is loaded first. Logs go to stderr and are filtered by
//! `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragchat::{chat, config, ingest, search, stats};

/// ragchat: a retrieval-augmented chat assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "ragchat: a retrieval-augmented chat assistant",
    version,
    long_about = "ragchat ingests PDF, DOCX, HTML, CSV and text documents into an exact \
    nearest-neighbor vector index and answers questions with a language model grounded \
    in the retrieved passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rag.toml`. Index, chunking, embedding, LLM,
    /// and ingest settings are read from this file.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest the data folder into a fresh index and save the snapshot.
    ///
    /// Overwrites any snapshot already at `[index].path`.
    Ingest {
        /// Data folder to ingest (overrides `[ingest].data_dir`).
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Print the chunks nearest to a query, with their distances.
    Query {
        /// The query text.
        query: String,

        /// Number of chunks to return (defaults to `[retrieval].num_chunks`).
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Chat with the assistant.
    ///
    /// Loads the snapshot, or ingests the data folder and saves one on first
    /// run. Type `exit` to quit.
    Chat,

    /// Summarize a saved snapshot without contacting any provider.
    Stats {
        /// Snapshot directory (overrides `[index].path`).
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // `stats` with an explicit path needs no config file.
    if let Commands::Stats { path: Some(path) } = &cli.command {
        stats::run_stats(path)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { path } => {
            ingest::run_ingest(&cfg, path)?;
        }
        Commands::Query { query, k } => {
            search::run_query(&cfg, &query, k.unwrap_or(cfg.retrieval.num_chunks))?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg)?;
        }
        Commands::Stats { path } => {
            stats::run_stats(path.as_deref().unwrap_or(&cfg.index.path))?;
        }
    }

    Ok(())
}
