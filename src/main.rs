//! # Message RAG CLI (`mrag`)
//!
//! ## Usage
//!
//! ```bash
//! mrag --config ./config/mrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mrag init` | Create the index schema and cache directory |
//! | `mrag ingest <file>` | Index messages from a JSON file |
//! | `mrag query "<question>"` | Answer a question with sources |
//! | `mrag interactive` | Ask questions in a loop |
//! | `mrag stats` | Show index statistics |
//! | `mrag delete <id>` | Delete one message |
//! | `mrag clear` | Delete every message in the collection |
//! | `mrag cache clear` | Remove cached LLM responses |
//! | `mrag serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use message_rag::app::{self, App};
use message_rag::{config, ingest, logging, query, server, stats};

/// Message RAG: question answering over message history with source
/// attribution.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/mrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "mrag",
    about = "Message RAG: answer questions from message history with sources",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema and cache directory.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Index messages from a JSON file (one object or an array).
    ///
    /// Invalid records are skipped with a warning.
    Ingest {
        /// Path to the JSON messages file.
        file: PathBuf,
    },

    /// Answer a question from the indexed messages.
    Query {
        /// The question to answer.
        question: String,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ask questions interactively. Type `quit` to leave.
    Interactive,

    /// Show index statistics.
    Stats,

    /// Delete one message by id.
    Delete {
        /// Message id.
        id: String,
    },

    /// Delete every message in the collection.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Manage the LLM response cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove cached responses.
    Clear {
        /// Only remove expired or unreadable entries.
        #[arg(long)]
        expired: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    // Cache maintenance does not need the index
    if let Commands::Cache {
        action: CacheAction::Clear { expired },
    } = cli.command
    {
        let Some(cache) = app::open_cache(&cfg)? else {
            println!("Response cache is disabled.");
            return Ok(());
        };
        let removed = if expired {
            cache.clear_expired()?
        } else {
            cache.clear()?
        };
        println!("Removed {} cache entries.", removed);
        return Ok(());
    }

    let app = App::open(&cfg).await?;

    match cli.command {
        Commands::Init => {
            println!(
                "Index initialized at {}",
                cfg.vector_db.db_path().display()
            );
        }
        Commands::Ingest { file } => {
            ingest::run_ingest(&app, &file).await?;
        }
        Commands::Query { question, json } => {
            query::run_query(&app, &question, json).await?;
        }
        Commands::Interactive => {
            query::run_interactive(&app).await?;
        }
        Commands::Stats => {
            stats::run_stats(&app).await?;
        }
        Commands::Delete { id } => {
            app.gateway.delete(&id).await?;
            println!("Deleted message {}", id);
        }
        Commands::Clear { yes } => {
            if !yes && !confirm_clear(&cfg.vector_db.collection_name)? {
                println!("Aborted.");
                return Ok(());
            }
            let before = app.gateway.count().await?;
            app.gateway.clear().await?;
            println!("Cleared {} messages.", before);
        }
        Commands::Serve => {
            server::run_server(app).await?;
        }
        Commands::Cache { .. } => {}
    }

    Ok(())
}

/// Ask for `yes` on a terminal. Non-interactive callers must pass `--yes`.
fn confirm_clear(collection: &str) -> anyhow::Result<bool> {
    if !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("refusing to clear without confirmation; pass --yes");
    }
    print!(
        "This deletes every message in '{}'. Type 'yes' to continue: ",
        collection
    );
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}
