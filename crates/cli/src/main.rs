//! Smore CLI, the main entry point.
//!
//! Commands:
//! - `init`: Write a default config and an empty notes file
//! - `chat`: Interactive chat or single-message mode
//! - `serve`: Start the HTTP/WebSocket gateway
//! - `tools`: List the tools the model can call
//! - `memory`: Inspect or edit the long-term notes

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "smore",
    about = "Smore: a personal assistant that lets a local model call tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.smore/config.toml and memory.md if missing
    Init,

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available tools
    Tools,

    /// Long-term notes
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryAction {
    /// Print the notes document
    Show,
    /// Add a bullet under an existing `## section`
    Add { section: String, note: String },
    /// Empty the notes document
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

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
        Commands::Init => commands::init::run()?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Memory { action } => match action {
            MemoryAction::Show => commands::memory::show().await?,
            MemoryAction::Add { section, note } => commands::memory::add(&section, &note).await?,
            MemoryAction::Clear => commands::memory::clear().await?,
        },
    }

    Ok(())
}
