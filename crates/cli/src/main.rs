//! IVAN CLI: the main entry point.
//!
//! Commands:
//! - `ask`    Single-message or interactive chat with the agent
//! - `parse`  Run a saved model reply through a response grammar
//! - `tools`  List the registered tools
//! - `watch-news` Re-analyse the market whenever the news changes
//! - `config` Show, locate or validate configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ivan_config::{BackendKind, GrammarKind};

mod commands;

#[derive(Parser)]
#[command(
    name = "ivan",
    about = "IVAN: Interactive Venture Analysis Network",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.ivan/config.toml
    #[arg(long, global = true, env = "IVAN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the assistant a question
    Ask {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Response grammar (json, xml, code_call)
        #[arg(short, long)]
        grammar: Option<GrammarKind>,

        /// Maximum model calls per message
        #[arg(long)]
        max_cycles: Option<u32>,

        /// Model backend (openai_compat, canned)
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Print `{"message": ...}` / `{"error": ...}` instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Parse a model reply from FILE (or stdin) and print the result
    Parse {
        /// Response grammar (json, xml, code_call)
        #[arg(short, long, default_value = "json")]
        grammar: GrammarKind,

        file: Option<PathBuf>,
    },

    /// List the tools the agent can call
    Tools,

    /// Poll the news and ask for an analysis whenever it changes
    WatchNews {
        /// Seconds between news checks
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,

        /// Check once and exit
        #[arg(long)]
        once: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ask {
            message,
            grammar,
            max_cycles,
            backend,
            json,
        } => {
            let options = commands::ask::AskOptions {
                message,
                grammar,
                max_cycles,
                backend,
                json,
            };
            commands::ask::run(config_path, options).await?
        }
        Commands::Parse { grammar, file } => commands::parse::run(grammar, file.as_deref()).await?,
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::WatchNews {
            interval_secs,
            once,
        } => {
            let options = commands::watch_news::WatchOptions {
                interval: Duration::from_secs(interval_secs),
                once,
            };
            commands::watch_news::run(config_path, options).await?
        }
        Commands::Config { action } => commands::config_cmd::run(config_path, action).await?,
    }

    Ok(())
}
