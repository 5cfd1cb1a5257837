//! Command-line arguments.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use webssh_client::TransferId;

/// Transfer files through a webssh server.
#[derive(Debug, Parser)]
#[command(name = "webssh-transfer", version, about)]
pub struct Cli {
    /// TOML file with url, prefix, target, target_label and timeout_secs
    #[arg(short, long, env = "WEBSSH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Server origin, e.g. http://localhost:8080
    #[arg(long, env = "WEBSSH_URL")]
    pub url: Option<String>,

    /// Path the server mounts its endpoints under
    #[arg(long, env = "WEBSSH_PREFIX")]
    pub prefix: Option<String>,

    /// Target descriptor, passed to the server as-is
    #[arg(short, long, env = "WEBSSH_TARGET", hide_env_values = true)]
    pub target: Option<String>,

    /// Name shown for the target in messages
    #[arg(long, env = "WEBSSH_TARGET_LABEL")]
    pub label: Option<String>,

    /// Per-request timeout
    #[arg(long, env = "WEBSSH_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List a remote directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Check whether the server can reach the target
    Check,
    /// Upload a local file into a remote directory
    Upload {
        file: PathBuf,
        remote_dir: String,
        /// Remote file name (defaults to the local one)
        #[arg(long)]
        name: Option<String>,
        /// Follow progress until the transfer finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// Download a remote file
    Download {
        path: String,
        /// Directory to save into
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Replace an existing file instead of picking a new name
        #[arg(long)]
        overwrite: bool,
    },
    /// Show the progress of a transfer
    Progress {
        id: TransferId,
        /// Print one snapshot instead of following
        #[arg(long)]
        poll: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_with_follow() {
        let cli = Cli::try_parse_from([
            "webssh-transfer",
            "--url",
            "http://localhost:8080",
            "-t",
            "box",
            "upload",
            "notes.txt",
            "/tmp",
            "--follow",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.target.as_deref(), Some("box"));
        match cli.command {
            Command::Upload {
                file,
                remote_dir,
                name,
                follow,
            } => {
                assert_eq!(file, PathBuf::from("notes.txt"));
                assert_eq!(remote_dir, "/tmp");
                assert_eq!(name, None);
                assert!(follow);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["webssh-transfer", "ls"]).unwrap();
        assert!(matches!(cli.command, Command::Ls { path } if path == "/"));
    }

    #[test]
    fn progress_id_must_not_be_empty() {
        assert!(Cli::try_parse_from(["webssh-transfer", "progress", ""]).is_err());
        let cli = Cli::try_parse_from(["webssh-transfer", "progress", "t3", "--poll"]).unwrap();
        assert!(matches!(cli.command, Command::Progress { ref id, poll: true } if id.as_str() == "t3"));
    }
}
