//! promptloom CLI: the main entry point.
//!
//! Commands:
//! - `compose`: compose a caller's document from a fixture
//! - `history`: list stored compositions for a caller
//! - `sections`: show the compiled section plan
//! - `config`: show, locate or validate configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "promptloom",
    about = "promptloom: personalized prompt composition",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of ~/.promptloom/config.toml
    #[arg(short, long, global = true, env = "PROMPTLOOM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the document for one caller
    Compose {
        /// JSON fixture holding caller data and the specification catalog
        #[arg(short, long)]
        fixture: PathBuf,

        /// Caller id
        #[arg(long)]
        caller: String,

        /// Print the structured document instead of the text summary
        #[arg(long)]
        json: bool,

        /// Persist the result to this SQLite database
        #[arg(long)]
        save: Option<PathBuf>,

        /// Trigger recorded with a saved composition
        #[arg(long, default_value = "manual")]
        trigger: String,

        /// Reference time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// List stored compositions for a caller, oldest first
    History {
        /// SQLite database written by `compose --save`
        #[arg(long)]
        db: PathBuf,

        /// Caller id
        #[arg(long)]
        caller: String,
    },

    /// Show the compiled section plan in execution order
    Sections,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the default config file path
    Path,
    /// Validate configuration and compile the section plan
    Validate,
    /// Print a default config file
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
        Commands::Compose {
            fixture,
            caller,
            json,
            save,
            trigger,
            at,
        } => {
            commands::compose::run(commands::compose::ComposeArgs {
                config: config_path,
                fixture: &fixture,
                caller: &caller,
                json,
                save: save.as_deref(),
                trigger: &trigger,
                at,
            })
            .await?
        }
        Commands::History { db, caller } => commands::history::run(&db, &caller).await?,
        Commands::Sections => commands::sections::run(config_path)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
            ConfigAction::Init => commands::config_cmd::init(),
        },
    }

    Ok(())
}
