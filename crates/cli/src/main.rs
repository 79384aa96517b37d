//! MindRelay command-line entry point.
//!
//! Commands:
//! - `chat`: Interactive or single-message chat through the fallback ladder
//! - `models`: List the aggregator catalog, grouped by tier
//! - `config`: Show, locate, create or validate the config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mindrelay",
    about = "MindRelay — resilient LLM chat routing with tiered fallback",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat(commands::chat::ChatArgs),

    /// List models known to the aggregator catalog
    Models {
        /// Only show one tier (S, A, B, C or the full name)
        #[arg(short, long)]
        tier: Option<String>,

        /// Show at most this many models per tier
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (keys redacted)
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file if none exists
    Init,
    /// Check the config file and report problems
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so replies stay pipeable.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat(args) => commands::chat::run(args).await?,
        Commands::Models { tier, limit } => commands::models::run(tier, limit).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
