//! Backchannel CLI, the main entry point.
//!
//! Commands:
//! - `chat`     Interactive chat (default)
//! - `tools`    List the background tools
//! - `onboard`  Write a default config file

use backchannel_config::AppConfig;
use clap::{Parser, Subcommand};

mod commands;
mod markdown;
mod terminal;

#[derive(Parser)]
#[command(
    name = "backchannel",
    about = "Backchannel: chat with an agent that runs its tools in the background",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (default)
    Chat,

    /// List available tools
    Tools,

    /// Create a default configuration file
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Logs go to stderr so they never interleave with the chat transcript.
    let debug = cli.verbose || config.as_ref().is_ok_and(|c| c.debug);
    let filter = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let config = config.map_err(|e| format!("Failed to load config: {e}"))?;
            commands::chat::run(config).await?
        }
        Commands::Tools => {
            let config = config.map_err(|e| format!("Failed to load config: {e}"))?;
            commands::tools::run(&config).await?
        }
        Commands::Onboard => commands::onboard::run()?,
    }

    Ok(())
}
