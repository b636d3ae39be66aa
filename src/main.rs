mod backend;
mod cli;
mod config;

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::{Result, WrapErr};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::ChatContext;
use crate::config::{ChatArgs, Settings};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Send one message, print the reply and exit
    #[arg(short, long)]
    input: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    chat: ChatArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Send one message, print the reply and exit
        #[arg(short, long)]
        input: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let (input, verbose) = match cli.command {
        Some(Commands::Chat { input, verbose }) => (input.or(cli.input), verbose || cli.verbose),
        None => (cli.input, cli.verbose),
    };

    // Logs go to stderr so they never interleave with the animated reply.
    let log_level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("Failed to set tracing subscriber")?;

    let settings = Settings::from_args(&cli.chat)?;
    info!("Starting CRM Assistant with {}", settings.backend.describe());

    let mut chat_context = ChatContext::new(
        Box::new(io::stdout()),
        input,
        true,
        settings,
    );
    chat_context.run().await
}
