use anyhow::Result;
use std::env;
use std::path::PathBuf;

use crate::cli::Cli;

const CACHE_FILE_NAME: &str = "mailcache.json";

/// Application-wide defaults. These can be overridden by env vars and CLI
/// flags but do not require any user-authored config files.
#[derive(Debug, Clone)]
pub struct AppDefaults {
    pub cache_path: PathBuf,
    pub label: String,
    pub query: String,
    pub max_messages: u32,
    pub log_file: Option<PathBuf>,
}

impl AppDefaults {
    pub fn load() -> Result<Self> {
        let cache_path = env::var("TRIAGE_CACHE_PATH")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_path);
        let label = env::var("TRIAGE_LABEL").unwrap_or_else(|_| "INBOX".to_string());
        let query = env::var("TRIAGE_QUERY").unwrap_or_else(|_| "is:unread".to_string());
        let max_messages = env::var("TRIAGE_MAX_MESSAGES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(500);
        let log_file = env::var("TRIAGE_LOG_FILE").ok().map(PathBuf::from);

        Ok(Self {
            cache_path,
            label,
            query,
            max_messages,
            log_file,
        })
    }

    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(path) = &cli.cache {
            self.cache_path = path.clone();
        }
        if let Some(query) = &cli.query {
            self.query = query.clone();
        }
        if let Some(max) = cli.max_messages.filter(|n| *n > 0) {
            self.max_messages = max;
        }
        if let Some(path) = &cli.log_file {
            self.log_file = Some(path.clone());
        }
        self
    }
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("triage")
}

fn default_cache_path() -> PathBuf {
    data_dir().join(CACHE_FILE_NAME)
}
