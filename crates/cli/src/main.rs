//! TurnLoop CLI: the operator entry point.
//!
//! Commands:
//! - `tools`: list, describe, call or text-execute built-in tools
//! - `replay`: drive the turn loop with a scripted model and print events
//! - `config`: show, initialize or locate the configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "turnloop",
    about = "TurnLoop: agentic turn engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.turnloop/config.toml
    #[arg(short, long, global = true, env = "TURNLOOP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and invoke built-in tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },

    /// Run the turn loop against a scripted model
    Replay {
        /// JSON array of responses (strings or response objects)
        script: PathBuf,

        /// The user request that starts the run
        #[arg(short, long)]
        prompt: String,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List registered tools
    List,

    /// Show a tool's parameters
    Describe { name: String },

    /// Invoke a tool with JSON arguments
    Call {
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Run every tool call found in free text
    Exec { text: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
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
        Commands::Tools { action } => {
            let config = commands::load_config(config_path)?;
            match action {
                ToolsAction::List => commands::tools::list(&config),
                ToolsAction::Describe { name } => commands::tools::describe(&config, &name)?,
                ToolsAction::Call { name, args } => commands::tools::call(&config, &name, &args).await?,
                ToolsAction::Exec { text } => commands::tools::exec(&config, &text).await,
            }
        }
        Commands::Replay { script, prompt, json } => {
            let config = commands::load_config(config_path)?;
            commands::replay::run(&config, &script, &prompt, json).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Init { force } => commands::config_cmd::init(config_path, force)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
        },
    }

    Ok(())
}
