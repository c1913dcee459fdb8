use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Pairing identifier (overrides config.json)
    #[arg(long, global = true)]
    pub pairing: Option<String>,

    /// Acting user identifier (overrides config.json)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Page date as YYYY-MM-DD (defaults to today)
    #[arg(long, global = true)]
    pub date: Option<String>,

    /// Store file path (overrides LEDGER_STORE_PATH)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show a day's page, creating it with carry-over on first view
    ///
    /// Example: ledger show --date 2026-08-07
    Show,
    /// Add a task to the shared list, or to your own with --personal
    ///
    /// Example: ledger add "Buy flowers"
    /// Example: ledger add "Call mom" --personal
    Add {
        text: Option<String>,
        #[arg(long)]
        personal: bool,
    },
    /// Toggle a task between done and open
    ///
    /// Example: ledger toggle 1754550000000
    /// Example: ledger toggle 1754550000000 --personal
    Toggle {
        id: i64,
        #[arg(long)]
        personal: bool,
    },
    /// Archive the page into history and clear it for reuse
    ///
    /// Example: ledger tear-off
    TearOff {
        /// Archive even if tasks are still open
        #[arg(long)]
        force: bool,
    },
    /// List archived pages, newest first
    ///
    /// Example: ledger history
    History,
    /// Restore an archived task into the current day's page
    ///
    /// Example: ledger restore doc-00000001 1754550000000
    Restore { archive_key: String, task_id: i64 },
}
