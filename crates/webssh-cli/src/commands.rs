//! Subcommand implementations.

use crate::cli::{Cli, Command};
use crate::config::{FileConfig, Settings};
use anyhow::{Context, bail};
use futures_util::StreamExt;
use serde::Serialize;
use std::path::Path;
use webssh_client::{
    DirEntry, DirectorySink, TransferClient, TransferId, TransferProgress, TransferState,
    UploadMetadata, UploadPayload,
};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&cli, file)?;
    let client = settings.client()?;
    let json = cli.json;
    tracing::debug!("Using {} with prefix {:?}", settings.url, settings.prefix);

    match cli.command {
        Command::Ls { path } => {
            tracing::info!("Listing {}", path);
            let entries = client
                .list_directory(settings.target()?, &path)
                .await
                .with_context(|| format!("failed to list {path}"))?;
            tracing::info!("Listed {} entries under {}", entries.len(), path);
            if json {
                print_json(&entries)?;
            } else {
                for entry in &entries {
                    println!("{}", format_entry(entry));
                }
            }
        }
        Command::Check => {
            let target = settings.target()?;
            tracing::info!("Checking {}", target);
            if !client.check_reachable(target).await? {
                bail!("{target} is not reachable");
            }
            println!("{target} is reachable");
        }
        Command::Upload {
            file,
            remote_dir,
            name,
            follow,
        } => {
            let name = match name {
                Some(name) => name,
                None => local_name(&file)?,
            };
            let payload = UploadPayload::from_file(&file)
                .await
                .with_context(|| format!("failed to open {}", file.display()))?;
            tracing::info!(
                "Uploading {} ({} bytes) to {} as {}",
                file.display(),
                payload.len(),
                remote_dir,
                name
            );
            let id = client
                .submit_upload(
                    settings.target()?,
                    &UploadMetadata::new(remote_dir, name),
                    payload,
                )
                .await?;
            tracing::info!("Upload accepted as transfer {}", id);
            println!("{id}");
            if follow {
                follow_progress(&client, &id, json).await?;
            }
        }
        Command::Download {
            path,
            out,
            overwrite,
        } => {
            tracing::info!("Downloading {} into {}", path, out.display());
            let sink = DirectorySink::new(out).overwrite(overwrite);
            let saved = client.download_to(settings.target()?, &path, &sink).await?;
            tracing::info!("Saved {} to {}", path, saved.display());
            println!("{}", saved.display());
        }
        Command::Progress { id, poll } => {
            tracing::info!("Reading progress of transfer {}", id);
            if poll {
                let snapshot = client.query_progress(&id).await?;
                print_progress(&snapshot, json)?;
            } else {
                follow_progress(&client, &id, json).await?;
            }
        }
    }
    Ok(())
}

fn local_name(file: &Path) -> anyhow::Result<String> {
    file.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("cannot derive a remote name from {}", file.display()))
}

/// Print every event until the transfer ends; a non-completed end is an error.
async fn follow_progress(
    client: &TransferClient,
    id: &TransferId,
    json: bool,
) -> anyhow::Result<()> {
    let mut channel = client.subscribe_progress(id).await?;
    tracing::debug!("Following transfer {}", id);
    let mut last = None;
    while let Some(event) = channel.next().await {
        let event = event?;
        print_progress(&event, json)?;
        last = Some(event);
    }

    if let Some(p) = &last {
        tracing::info!(
            "Transfer {} finished {} after {} events",
            id,
            p.state,
            channel.delivered()
        );
    }
    match last {
        Some(p) if p.state == TransferState::Completed => Ok(()),
        Some(p) => bail!(
            "transfer {} {}: {}",
            id,
            p.state,
            p.message.as_deref().unwrap_or("no reason given")
        ),
        None => bail!("transfer {id} ended without a final state"),
    }
}

fn print_progress(progress: &TransferProgress, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(progress);
    }
    println!("{}", format_progress(progress));
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn format_progress(p: &TransferProgress) -> String {
    let total = p
        .total_bytes
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());
    match p.fraction() {
        Some(f) => format!(
            "{} {} {}/{} ({:.1}%)",
            p.id,
            p.state,
            p.bytes_transferred,
            total,
            f * 100.0
        ),
        None => format!("{} {} {}/{}", p.id, p.state, p.bytes_transferred, total),
    }
}

fn format_entry(entry: &DirEntry) -> String {
    let kind = if entry.is_dir { 'd' } else { '-' };
    format!(
        "{} {:>12} {:>12} {}",
        kind, entry.size, entry.modify_time, entry.name
    )
}
