use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "deckdb",
    about = "Store document cards and search them by keyword"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Maximum number of documents fetched at once
    #[arg(long, global = true, env = "DECKDB_CONCURRENCY")]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load changed cards from a directory and prune removed ones
    Sync(SyncArgs),
    /// Load changed cards listed in a manifest from an HTTP server
    SyncRemote(SyncRemoteArgs),
    /// Search cards by keyword
    Search(SearchArgs),
    /// List the most recently updated cards
    Recent(RecentArgs),
    /// Show a single card
    Get(GetArgs),
    /// Remove a card and its index entries
    Remove(RemoveArgs),
    /// Show store statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct SyncArgs {
    /// Directory holding .md, .html and .htm cards
    pub dir: PathBuf,

    /// Glob of root-relative paths to skip (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct SyncRemoteArgs {
    /// JSON file listing cards as [{"path": ..., "hash": ...}]
    pub manifest: PathBuf,

    /// URL that card paths are resolved against
    #[arg(long)]
    pub base_url: String,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Maximum number of results
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct RecentArgs {
    /// Maximum number of cards
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Card path, e.g. /guide/intro.md
    pub path: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct RemoveArgs {
    /// Card path
    pub path: String,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "deckdb",
            &mut std::io::stdout(),
        );
    }
}
