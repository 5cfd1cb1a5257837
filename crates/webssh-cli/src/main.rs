//! `webssh-transfer`: upload, download and follow transfers from the shell.
//!
//! ```text
//! webssh-transfer --url http://localhost:8080 --prefix webssh -t box ls /srv
//! webssh-transfer -t box upload notes.txt /tmp --follow
//! webssh-transfer -t box download /tmp/notes.txt --out ./downloads
//! webssh-transfer progress t1 --poll
//! ```

mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    commands::run(cli).await
}

/// Logs go to stderr so command output stays pipeable. `RUST_LOG` overrides
/// the verbosity flags.
fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "webssh_transfer={level},webssh_client={level},webssh_core={level}"
        ))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
