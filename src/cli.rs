use std::path::PathBuf;

use clap::Parser;

/// Command-line options for triage. Flags override the `TRIAGE_*` env vars.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Path of the message cache file.
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Gmail search query used to list inbox messages.
    #[arg(long)]
    pub query: Option<String>,

    /// Upper bound on message ids listed per sync.
    #[arg(long)]
    pub max_messages: Option<u32>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
