//! In-memory transport.
//!
//! Simulates a server without any network: uploads are accepted
//! immediately and processed by a background task, downloads and listings
//! are served from a seeded file table, and progress channels can be
//! scripted to misbehave.

use super::{ProgressFrames, Transport, UploadPayload};
use crate::{Operation, TransferError};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use webssh_core::{
    DirEntry, Target, TransferId, TransferProgress, TransferState, UploadMetadata,
};

/// A transport backed by in-process state. Clones share that state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Bytes>,
    transfers: HashMap<TransferId, watch::Sender<TransferProgress>>,
    scripts: HashMap<TransferId, Vec<TransferProgress>>,
    unreachable: HashSet<String>,
    next_id: u64,
    processing: Processing,
    max_upload: Option<u64>,
    offline: bool,
}

#[derive(Debug, Clone, Copy)]
struct Processing {
    chunk: u64,
    delay: Duration,
}

impl Default for Processing {
    fn default() -> Self {
        Self {
            chunk: 64 * 1024,
            delay: Duration::ZERO,
        }
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a remote file for downloads and listings.
    pub fn insert_file(&self, path: impl Into<String>, contents: impl Into<Bytes>) {
        self.state().files.insert(path.into(), contents.into());
    }

    /// Contents of a remote file, including completed uploads.
    pub fn file(&self, path: &str) -> Option<Bytes> {
        self.state().files.get(path).cloned()
    }

    /// Make reachability checks and target-scoped calls fail for `target`.
    pub fn mark_unreachable(&self, target: &Target) {
        self.state().unreachable.insert(target.as_raw().to_string());
    }

    /// Reject uploads larger than `limit` bytes.
    pub fn set_max_upload(&self, limit: u64) {
        self.state().max_upload = Some(limit);
    }

    /// Fail every call as if the server could not be reached.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Control how fast accepted uploads are processed: `chunk` bytes per
    /// step, `delay` between steps.
    pub fn set_processing(&self, chunk: u64, delay: Duration) {
        self.state().processing = Processing {
            chunk: chunk.max(1),
            delay,
        };
    }

    /// Serve exactly `frames` to the next subscriber of `id`, then close the
    /// connection. Without a terminal frame at the end this simulates a
    /// dropped channel.
    pub fn script_progress(&self, id: TransferId, frames: Vec<TransferProgress>) {
        self.state().scripts.insert(id, frames);
    }

    /// Drop every transfer that reached a terminal state, as a server does
    /// after its retention period.
    pub fn collect_garbage(&self) {
        self.state()
            .transfers
            .retain(|_, tx| !tx.borrow().is_terminal());
    }

    fn ensure_online(&self, operation: Operation, subject: &str) -> Result<(), TransferError> {
        if self.state().offline {
            return Err(TransferError::transport(
                operation,
                subject,
                "connection refused",
            ));
        }
        Ok(())
    }

    fn ensure_reachable(&self, operation: Operation, target: &Target) -> Result<(), TransferError> {
        self.ensure_online(operation, &target.to_string())?;
        if self.state().unreachable.contains(target.as_raw()) {
            return Err(TransferError::Rejected {
                operation,
                subject: target.to_string(),
                reason: "ssh: handshake failed".to_string(),
            });
        }
        Ok(())
    }
}

/// Move the received upload into the file table step by step, publishing
/// progress after each step.
async fn process_upload(
    transport: MemoryTransport,
    tx: watch::Sender<TransferProgress>,
    path: String,
    data: Bytes,
    processing: Processing,
) {
    let total = data.len() as u64;
    let mut done = 0;
    while done < total {
        if !processing.delay.is_zero() {
            tokio::time::sleep(processing.delay).await;
        }
        done = (done + processing.chunk).min(total);
        tx.send_modify(|p| {
            p.bytes_transferred = done;
            p.state = TransferState::InProgress;
        });
    }

    transport.insert_file(path, data);
    tx.send_modify(|p| {
        p.bytes_transferred = total;
        p.state = TransferState::Completed;
    });
}

fn remote_join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

impl Transport for MemoryTransport {
    async fn submit_upload(
        &self,
        target: &Target,
        metadata: &UploadMetadata,
        payload: UploadPayload,
    ) -> Result<TransferId, TransferError> {
        let operation = Operation::Upload;
        self.ensure_reachable(operation, target)?;

        let declared = payload.len();
        let max_upload = self.state().max_upload;
        if let Some(limit) = max_upload {
            if declared > limit {
                return Err(TransferError::Rejected {
                    operation,
                    subject: target.to_string(),
                    reason: format!("payload of {declared} bytes exceeds limit of {limit}"),
                });
            }
        }

        let chunks: Vec<Bytes> = payload
            .into_stream()
            .try_collect()
            .await
            .map_err(|e| TransferError::transport(operation, target.to_string(), e))?;
        let data = Bytes::from(chunks.concat());

        let (id, tx, processing) = {
            let mut state = self.state();
            state.next_id += 1;
            let id = TransferId::new(format!("t{}", state.next_id));
            let (tx, _) = watch::channel(TransferProgress::pending(
                id.clone(),
                Some(data.len() as u64),
            ));
            state.transfers.insert(id.clone(), tx.clone());
            (id, tx, state.processing)
        };

        let path = remote_join(&metadata.remote_dir, &metadata.file_name);
        tokio::spawn(process_upload(self.clone(), tx, path, data, processing));

        Ok(id)
    }

    async fn download(&self, target: &Target, path: &str) -> Result<Bytes, TransferError> {
        let operation = Operation::Download;
        self.ensure_reachable(operation, target)?;
        self.state()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| TransferError::NotFound {
                operation,
                subject: target.to_string(),
                what: format!("{path}: no such file"),
            })
    }

    async fn query_progress(&self, id: &TransferId) -> Result<TransferProgress, TransferError> {
        let operation = Operation::PollProgress;
        let subject = format!("transfer {id}");
        self.ensure_online(operation, &subject)?;
        let state = self.state();
        match state.transfers.get(id) {
            Some(tx) => Ok(tx.borrow().clone()),
            None => Err(TransferError::NotFound {
                operation,
                subject,
                what: "unknown transfer id".to_string(),
            }),
        }
    }

    async fn open_progress(&self, id: &TransferId) -> Result<ProgressFrames, TransferError> {
        let operation = Operation::Subscribe;
        let subject = format!("transfer {id}");
        self.ensure_online(operation, &subject)?;

        let mut state = self.state();
        if let Some(frames) = state.scripts.remove(id) {
            return Ok(stream::iter(frames.into_iter().map(Ok::<_, TransferError>)).boxed());
        }

        let Some(tx) = state.transfers.get(id) else {
            return Err(TransferError::NotFound {
                operation,
                subject,
                what: "unknown transfer id".to_string(),
            });
        };

        // Current snapshot first, then every change until a terminal state.
        let rx = tx.subscribe();
        let frames = stream::unfold(Some((rx, true)), move |cursor| {
            let subject = subject.clone();
            async move {
                let (mut rx, first) = cursor?;
                if !first && rx.changed().await.is_err() {
                    let lost = TransferError::transport(operation, subject, "server went away");
                    return Some((Err(lost), None));
                }
                let snapshot = rx.borrow_and_update().clone();
                let next = (!snapshot.is_terminal()).then_some((rx, false));
                Some((Ok(snapshot), next))
            }
        });
        Ok(frames.boxed())
    }

    async fn list_directory(
        &self,
        target: &Target,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferError> {
        let operation = Operation::ListDirectory;
        self.ensure_reachable(operation, target)?;

        let dir = format!("{}/", path.trim_end_matches('/'));
        let state = self.state();
        let mut entries: BTreeMap<String, DirEntry> = BTreeMap::new();
        for (file, contents) in state.files.range(dir.clone()..) {
            let Some(rest) = file.strip_prefix(&dir) else {
                break;
            };
            let entry = match rest.split_once('/') {
                Some((sub, _)) => DirEntry {
                    name: sub.to_string(),
                    size: 0,
                    modify_time: String::new(),
                    is_dir: true,
                },
                None => DirEntry {
                    name: rest.to_string(),
                    size: contents.len() as u64,
                    modify_time: String::new(),
                    is_dir: false,
                },
            };
            entries.entry(entry.name.clone()).or_insert(entry);
        }

        if entries.is_empty() && path != "/" {
            return Err(TransferError::NotFound {
                operation,
                subject: target.to_string(),
                what: format!("{path}: no such file or directory"),
            });
        }
        Ok(entries.into_values().collect())
    }

    async fn check_reachable(&self, target: &Target) -> Result<bool, TransferError> {
        self.ensure_online(Operation::CheckReachable, &target.to_string())?;
        Ok(!self.state().unreachable.contains(target.as_raw()))
    }
}
