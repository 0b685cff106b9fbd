//! # gearstep
//!
//! Command-line entry point: parses arguments, initialises logging and
//! dispatches to the `cmd_*` functions.

use clap::{Parser, Subcommand};
use gearstep::cli::{cmd_normalize, cmd_plan, cmd_search, cmd_serve, cmd_validate};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gearstep", version, about = "Equipment configuration dialogue server")]
struct Cli {
    /// Path to gearstep.json
    #[arg(short, long, global = true, default_value = "gearstep.json")]
    config: PathBuf,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to bind, overriding the config
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Load and cross-check the stage config and catalog
    Validate,
    /// Preview the stage sequence for a root product
    Plan {
        #[arg(short, long)]
        root: Option<String>,
    },
    /// Run one consolidated search for a stage
    Search {
        #[arg(short, long)]
        stage: String,
        #[arg(short, long, default_value = "")]
        text: String,
        /// Product treated as an earlier selection (repeatable)
        #[arg(long = "select")]
        selects: Vec<String>,
    },
    /// Show the unit-normalized form of some text
    Normalize { text: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gearstep=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve { bind } => cmd_serve(&cli.config, bind.as_deref()).await,
        Command::Validate => cmd_validate(&cli.config, cli.json),
        Command::Plan { root } => cmd_plan(&cli.config, root.as_deref(), cli.json),
        Command::Search {
            stage,
            text,
            selects,
        } => cmd_search(&cli.config, &stage, &text, &selects, cli.json).await,
        Command::Normalize { text } => cmd_normalize(&text, cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
