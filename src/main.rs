use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use triage::app;
use triage::cli::Cli;
use triage::config::AppDefaults;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = AppDefaults::load()?.merge_cli(&cli);
    init_tracing(settings.log_file.as_deref())?;

    app::run(settings).await
}

/// The TUI owns the terminal, so logs only reach stderr when explicitly
/// requested through `RUST_LOG` and otherwise go to the configured file.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env());

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        let subscriber = builder.with_ansi(false).with_writer(Mutex::new(file)).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    Ok(())
}
