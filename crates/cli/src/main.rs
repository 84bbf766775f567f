//! Tally CLI - Main entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_cli::{commands, AppContext};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - shared running-total ledger", long_about = None)]
struct Cli {
    /// Config file path (JSON); defaults apply if the file does not exist
    #[arg(short, long, default_value = "tally.json")]
    config: PathBuf,

    /// Database file path
    #[arg(long, default_value = "tally.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the status panel (total, mode, pending, release preview)
    Status,

    /// Add an amount to the total (opens a time-boxed confirmation)
    Add {
        /// Amount, e.g. "420" or "420.50"
        amount: String,
        /// Operator id performing the add
        #[arg(long)]
        operator: i64,
    },

    /// Release the total: fee taken, counter reset, session advanced
    Release {
        /// Operator id performing the release
        #[arg(long)]
        operator: i64,
    },

    /// Undo the single most recent movement
    Undo {
        /// Operator id performing the undo
        #[arg(long)]
        operator: i64,
    },

    /// List recent releases
    History {
        /// Maximum number of releases to show
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Approve a pending confirmation
    Confirm {
        /// Movement id of the pending add
        movement_id: i64,
        /// Operator id approving
        #[arg(long)]
        operator: i64,
    },

    /// Get or set the tracking mode
    Mode {
        #[command(subcommand)]
        command: ModeCommands,
    },

    /// Sender trust management
    Trust {
        #[command(subcommand)]
        command: TrustCommands,
    },

    /// Admin reversal of auto-applied entries
    Reversal {
        #[command(subcommand)]
        command: ReversalCommands,
    },

    /// Feed a JSON file of parsed events through the ingestion pipeline
    IngestBatch {
        /// Path to a JSON array of parsed events
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ModeCommands {
    /// Show the current tracking mode
    Get,
    /// Set the tracking mode (auto | manual)
    Set {
        mode: String,
        #[arg(long)]
        operator: i64,
    },
}

#[derive(Subcommand)]
enum TrustCommands {
    /// List every sender and its trust state
    List,
    /// Approve a sender (from any state)
    Approve {
        /// Normalized identity key, e.g. jane@bank
        key: String,
        #[arg(long)]
        operator: i64,
    },
    /// Block a sender (future events are ignored)
    Block {
        key: String,
        #[arg(long)]
        operator: i64,
    },
}

#[derive(Subcommand)]
enum ReversalCommands {
    /// List recent auto-applied entries eligible for reversal
    List {
        #[arg(long, default_value = "10")]
        limit: u32,
    },
    /// Reverse a previously auto-applied entry by event id
    Apply {
        event_id: String,
        #[arg(long)]
        operator: i64,
        /// Reason recorded with the reversal
        #[arg(long)]
        reason: Option<String>,
        /// Also block the sender in the same transaction
        #[arg(long)]
        block_sender: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let ctx = AppContext::new(&cli.config, &cli.db)?;

    match cli.command {
        Commands::Status => commands::status(&ctx)?,

        Commands::Add { amount, operator } => commands::add(&ctx, operator, &amount)?,

        Commands::Release { operator } => commands::release(&ctx, operator)?,

        Commands::Undo { operator } => commands::undo(&ctx, operator)?,

        Commands::History { limit } => commands::history(&ctx, limit)?,

        Commands::Confirm {
            movement_id,
            operator,
        } => commands::confirm(&ctx, movement_id, operator)?,

        Commands::Mode { command } => match command {
            ModeCommands::Get => commands::mode_get(&ctx)?,
            ModeCommands::Set { mode, operator } => commands::mode_set(&ctx, &mode, operator)?,
        },

        Commands::Trust { command } => match command {
            TrustCommands::List => commands::trust_list(&ctx)?,
            TrustCommands::Approve { key, operator } => {
                commands::trust_approve(&ctx, &key, operator)?
            }
            TrustCommands::Block { key, operator } => commands::trust_block(&ctx, &key, operator)?,
        },

        Commands::Reversal { command } => match command {
            ReversalCommands::List { limit } => commands::reversal_list(&ctx, limit)?,
            ReversalCommands::Apply {
                event_id,
                operator,
                reason,
                block_sender,
            } => commands::reversal_apply(&ctx, &event_id, operator, reason.as_deref(), block_sender)?,
        },

        Commands::IngestBatch { file } => commands::ingest_batch(&ctx, &file).await?,
    }

    Ok(())
}
