//! Montage CLI: render edits, run batches, manage history and saved exports.
//!
//! Usage:
//!   montage render <REQUEST>          Render an editor-state request (JSON)
//!   montage batch <SOURCE> <STEPS>    Run a sequential batch of operations
//!   montage history <COMMAND>         Append, undo, redo, show or clear snapshots
//!   montage exports <COMMAND>         Save, list, extend, delete or sweep saved exports
//!   montage check                     Check engine availability and configuration
//!
//! Exit status is 2 for caller mistakes (bad input, unknown or foreign
//! records) and 1 for everything else.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use montage_common::{AppConfig, Fault, LoggingConfig, MontageError};

mod commands;

#[derive(Parser)]
#[command(
    name = "montage",
    about = "Non-destructive video edits rendered through ffmpeg",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an editor-state request
    Render {
        /// Path to the request JSON ("-" for stdin)
        request: PathBuf,

        /// Override the request's source video
        #[arg(long)]
        source: Option<String>,

        /// Write to this path instead of a unique file in the work dir
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use a platform preset instead of the request's export options
        #[arg(long)]
        platform: Option<String>,
    },

    /// Run a sequence of operations, each step feeding the next
    Batch {
        /// Source video path or URL
        source: String,

        /// Path to a JSON array of operations
        steps: PathBuf,

        /// Final output path
        #[arg(short, long)]
        output: PathBuf,

        /// Platform preset for the output profile
        #[arg(long)]
        platform: Option<String>,
    },

    /// Undo/redo history of editor snapshots
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Saved exports with expiry
    Exports {
        #[command(subcommand)]
        command: ExportsCommand,
    },

    /// Check engine availability and configuration
    Check,
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    /// Record a snapshot of editor state
    Push {
        content_id: String,

        /// Path to the state JSON ("-" for stdin)
        state: PathBuf,
    },
    /// Step back one snapshot
    Undo { content_id: String },
    /// Step forward one snapshot
    Redo { content_id: String },
    /// Print the history
    Show { content_id: String },
    /// Drop all snapshots
    Clear { content_id: String },
}

#[derive(Subcommand)]
pub enum ExportsCommand {
    /// Copy a render into saved storage
    Save {
        owner_id: String,
        content_id: String,

        /// Render output path or URL
        source: String,

        #[arg(long)]
        title: Option<String>,

        /// Quality label shown to the user
        #[arg(long)]
        quality: Option<String>,

        /// Days to keep (clamped to 1..=365)
        #[arg(long)]
        days: Option<i64>,
    },
    /// List saved exports, newest first
    List {
        owner_id: String,

        #[arg(long)]
        content_id: Option<String>,
    },
    /// Extend an export's expiry
    Extend {
        id: String,
        owner_id: String,

        #[arg(long, default_value = "10")]
        days: i64,
    },
    /// Delete an export and its file
    Delete { id: String, owner_id: String },
    /// Remove every expired export
    Sweep,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    montage_common::logging::init_logging(&LoggingConfig {
        level,
        ..config.logging.clone()
    });

    let result = match cli.command {
        Commands::Render {
            request,
            source,
            output,
            platform,
        } => commands::render::run(&config, request, source, output, platform).await,
        Commands::Batch {
            source,
            steps,
            output,
            platform,
        } => commands::batch::run(&config, source, steps, output, platform).await,
        Commands::History { command } => commands::history::run(&config, command),
        Commands::Exports { command } => commands::exports::run(&config, command).await,
        Commands::Check => commands::check::run(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let fault = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<MontageError>())
        .map(MontageError::fault);
    match fault {
        Some(Fault::Client) => 2,
        _ => 1,
    }
}
