//! # docshelf CLI
//!
//! ## Usage
//!
//! ```bash
//! docshelf [--config ./docshelf.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docshelf serve` | Start the HTTP server |
//! | `docshelf sources` | List the documents in the corpus |
//! | `docshelf get <filename>` | Write one document to stdout or `--output` |
//! | `docshelf ingest <archive.zip>` | Replace the corpus with the archive contents |
//!
//! Logging goes to stderr and is filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docshelf::config;
use docshelf::store::CorpusStore;
use docshelf::{get, ingest, server, sources};

/// docshelf: serve a directory of Markdown and PDF documents.
#[derive(Parser)]
#[command(
    name = "docshelf",
    about = "Serve a directory of Markdown and PDF documents over HTTP",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Optional; defaults and `DOCSHELF_*` environment variables apply
    /// without it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// List the `.md` and `.pdf` documents in the corpus.
    Sources,

    /// Retrieve one document by filename.
    Get {
        /// Filename relative to the corpus root.
        filename: String,

        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replace the whole corpus with the contents of a zip archive.
    Ingest {
        /// Path to a `.zip` file.
        archive: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(cli.config.as_deref())?;
    let store = CorpusStore::new(&cfg.corpus.root);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Sources => {
            sources::run_sources(&store).await?;
        }
        Commands::Get { filename, output } => {
            get::run_get(&store, &filename, output.as_deref()).await?;
        }
        Commands::Ingest { archive } => {
            ingest::run_ingest(&store, &archive).await?;
        }
    }

    Ok(())
}
