//! Persisting finished downloads.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use webssh_core::DownloadResult;

/// Somewhere a finished download can be saved under its suggested name.
pub trait DownloadSink: Send + Sync {
    /// Store the payload and return where it ended up.
    fn persist(&self, download: &DownloadResult) -> impl Future<Output = io::Result<PathBuf>> + Send;
}

/// Saves downloads into a local directory.
///
/// Files are written to a hidden `.part` sibling and moved into place, so
/// a reader never sees a partial file. Existing files are kept and the new
/// one gets a ` (n)` suffix unless overwriting is enabled.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    overwrite: bool,
}

/// Sequence for partial file names; unique per process.
static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: false,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn partial_path(&self, name: &str) -> PathBuf {
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(".{name}.{}-{seq}.part", std::process::id()))
    }

    /// Move `partial` to its final name.
    ///
    /// Without overwrite the destination is claimed with a hard link, which
    /// fails instead of replacing a file that appeared in the meantime.
    async fn place(&self, partial: &Path, name: &str) -> io::Result<PathBuf> {
        if self.overwrite {
            let dest = self.dir.join(name);
            tokio::fs::rename(partial, &dest).await?;
            return Ok(dest);
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };
        let mut n: u64 = 0;
        loop {
            let candidate = match (n, ext) {
                (0, _) => name.to_string(),
                (n, Some(ext)) => format!("{stem} ({n}).{ext}"),
                (n, None) => format!("{stem} ({n})"),
            };
            let dest = self.dir.join(candidate);
            match tokio::fs::hard_link(partial, &dest).await {
                Ok(()) => {
                    if let Err(e) = tokio::fs::remove_file(partial).await {
                        tracing::warn!("Failed to remove {}: {}", partial.display(), e);
                    }
                    return Ok(dest);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

fn checked_name(name: &str) -> io::Result<&str> {
    let plain = Path::new(name).file_name().and_then(|n| n.to_str());
    match plain {
        Some(n) if n == name => Ok(name),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to save to unsafe name {name:?}"),
        )),
    }
}

impl DownloadSink for DirectorySink {
    async fn persist(&self, download: &DownloadResult) -> io::Result<PathBuf> {
        let name = checked_name(&download.suggested_name)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let partial = self.partial_path(name);
        tokio::fs::write(&partial, &download.bytes).await?;
        let dest = match self.place(&partial, name).await {
            Ok(dest) => dest,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        tracing::debug!("Saved {} bytes to {}", download.bytes.len(), dest.display());
        Ok(dest)
    }
}
