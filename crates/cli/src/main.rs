//! ClawLoop CLI — the main entry point.
//!
//! Commands:
//! - `replay`  — Run the controller against a scripted model
//! - `config`  — Print or validate configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "clawloop",
    about = "ClawLoop — a resumable reasoning/acting agent loop",
    version,
    author
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
    /// Run one message through the loop with model turns replayed from a file
    Replay {
        /// JSON file holding a list of model turns, each a list of stream fragments
        #[arg(short, long)]
        script: PathBuf,

        /// The user message to start with
        #[arg(short, long)]
        message: String,

        /// Answer for a suspended tool call; repeat to answer several in order
        #[arg(short, long = "answer")]
        answers: Vec<String>,

        /// Config file (defaults to ~/.clawloop/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Require the model to answer through the `finish` tool
        #[arg(long)]
        structured: bool,

        /// Print the terminal turn as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config {
        /// Validate and print the effective configuration instead of the defaults
        #[arg(long)]
        validate: bool,
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

    match cli.command {
        Commands::Replay {
            script,
            message,
            answers,
            config,
            structured,
            json,
        } => {
            commands::replay::run(commands::replay::ReplayArgs {
                script,
                message,
                answers,
                config,
                structured,
                json,
            })
            .await?
        }
        Commands::Config { validate } => commands::config_cmd::run(validate)?,
    }

    Ok(())
}
