//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod helpers;
mod replay;
#[cfg(feature = "browser")]
mod scrape;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::load_settings;
use crate::models::ListingKind;

#[derive(Parser)]
#[command(name = "scrollharvest")]
#[command(about = "Harvest infinite-scroll listings as JSON lines")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Where records and enqueued URLs go.
#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    /// Write records to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write enqueued detail-page URLs to this file, one per line
    #[arg(long)]
    enqueue_output: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a listing page in the browser and harvest it
    #[cfg(feature = "browser")]
    Scrape {
        /// Page URL (post, profile, hashtag or place page)
        url: String,
        /// Listing kind: post-comments, profile-posts, hashtag-posts, place-posts
        #[arg(short, long)]
        kind: ListingKind,
        /// Owner id (post short code, user id, tag name or location id)
        #[arg(long)]
        owner: String,
        /// Maximum number of items to harvest (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Wait after each scroll, in milliseconds
        #[arg(long)]
        scroll_wait_ms: Option<u64>,
        /// Stop once items get older than this (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        newer_than: Option<String>,
        /// Username echoed into post records
        #[arg(long)]
        username: Option<String>,
        /// Location name echoed into post records
        #[arg(long)]
        location_name: Option<String>,
        /// JSON object merged into every record
        #[arg(long)]
        user_data: Option<String>,
        /// Page load attempts when the page does not render
        #[arg(long, default_value = "3")]
        retries: u32,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Replay a recorded page session offline
    Replay {
        /// Recorded session (JSON)
        session: PathBuf,
        /// Wait after each replayed drive step, in milliseconds
        #[arg(long, default_value = "50")]
        settle_ms: u64,
        #[command(flatten)]
        output: OutputArgs,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, _config) = load_settings(cli.config.as_deref()).await?;

    match cli.command {
        #[cfg(feature = "browser")]
        Commands::Scrape {
            url,
            kind,
            owner,
            limit,
            scroll_wait_ms,
            newer_than,
            username,
            location_name,
            user_data,
            retries,
            output,
        } => {
            let args = scrape::ScrapeArgs {
                url,
                kind,
                owner,
                limit,
                scroll_wait_ms,
                newer_than,
                username,
                location_name,
                user_data,
                retries,
            };
            scrape::cmd_scrape(&settings, args, &output).await
        }
        Commands::Replay {
            session,
            settle_ms,
            output,
        } => replay::cmd_replay(&settings, &session, settle_ms, &output).await,
    }
}
