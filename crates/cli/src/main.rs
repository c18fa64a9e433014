//! Stepwise CLI, the main entry point.
//!
//! Commands:
//! - `ask`     Answer a single question
//! - `chat`    Interactive session with slash commands
//! - `tools`   List the built-in capabilities and their schemas
//! - `config`  Show the effective configuration or write the default file

use clap::{Parser, Subcommand};

mod commands;

use commands::Overrides;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Stepwise: a ReAct agent that reasons step by step and calls tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the configured provider (e.g. "openai", "custom:http://host/v1")
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Override the configured model
    #[arg(long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question to answer
        query: String,

        /// Override the step budget
        #[arg(long)]
        max_steps: Option<usize>,

        /// Print the execution summary as JSON instead of the answer
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive session
    Chat,

    /// List the built-in capabilities
    Tools,

    /// Show the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries answers only
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let overrides = Overrides {
        provider: cli.provider,
        model: cli.model,
    };

    match cli.command {
        Commands::Ask {
            query,
            max_steps,
            json,
        } => commands::ask::run(&query, max_steps, json, &overrides).await?,
        Commands::Chat => commands::chat::run(&overrides).await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Config { init, force } => commands::config_cmd::run(init, force, &overrides)?,
    }

    Ok(())
}
