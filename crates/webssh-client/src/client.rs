//! The transfer client.

use crate::channel::ProgressChannel;
use crate::sink::DownloadSink;
use crate::transport::{HttpTransport, Transport, UploadPayload};
use crate::{ClientConfig, ConfigError, Operation, TransferError};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use webssh_core::{
    DirEntry, DownloadResult, Target, TransferId, TransferProgress, UploadMetadata, final_segment,
};

/// Entry point for uploads, downloads and progress subscriptions.
///
/// Clones share the transport. Concurrent calls are independent; each
/// progress subscription gets its own connection.
pub struct TransferClient<T = HttpTransport> {
    transport: Arc<T>,
    timeout: Option<Duration>,
}

impl<T> Clone for TransferClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            timeout: self.timeout,
        }
    }
}

impl TransferClient<HttpTransport> {
    /// Client for a webssh server over HTTP and WebSocket.
    ///
    /// The configuration's timeout becomes the default per-call deadline.
    pub fn connect(config: ClientConfig) -> Result<Self, ConfigError> {
        let timeout = config.timeout();
        let client = Self::new(HttpTransport::new(config)?);
        Ok(match timeout {
            Some(limit) => client.with_timeout(limit),
            None => client,
        })
    }
}

impl<T: Transport> TransferClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            timeout: None,
        }
    }

    /// Bound every individual call by `limit`.
    ///
    /// Expiry yields `Timeout`; it abandons the local wait only and does not
    /// touch the remote transfer.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit an upload and return its id once the server has accepted it.
    ///
    /// The remote side keeps processing after this returns; follow it with
    /// [`subscribe_progress`](Self::subscribe_progress) or
    /// [`query_progress`](Self::query_progress). Not retried on failure.
    pub async fn submit_upload(
        &self,
        target: &Target,
        metadata: &UploadMetadata,
        payload: UploadPayload,
    ) -> Result<TransferId, TransferError> {
        let operation = Operation::Upload;
        metadata
            .validate()
            .map_err(|source| TransferError::InvalidRequest { operation, source })?;

        let len = payload.len();
        let id = self
            .bounded(
                operation,
                target,
                self.transport.submit_upload(target, metadata, payload),
            )
            .await?;
        tracing::info!(
            "Upload of {} ({} bytes) to {} on {} accepted as {}",
            metadata.file_name,
            len,
            metadata.remote_dir,
            target,
            id
        );
        Ok(id)
    }

    /// Download a remote file in full.
    ///
    /// Either the whole payload is returned or an error; partial bytes are
    /// never surfaced.
    pub async fn request_download(
        &self,
        target: &Target,
        path: &str,
    ) -> Result<DownloadResult, TransferError> {
        let operation = Operation::Download;
        final_segment(path).map_err(|source| TransferError::InvalidRequest { operation, source })?;

        let bytes = self
            .bounded(operation, target, self.transport.download(target, path))
            .await?;
        tracing::debug!("Downloaded {} ({} bytes) from {}", path, bytes.len(), target);
        DownloadResult::new(path, Vec::from(bytes))
            .map_err(|source| TransferError::InvalidRequest { operation, source })
    }

    /// Download a remote file and hand it to `sink`.
    pub async fn download_to<S: DownloadSink>(
        &self,
        target: &Target,
        path: &str,
        sink: &S,
    ) -> Result<PathBuf, TransferError> {
        let download = self.request_download(target, path).await?;
        sink.persist(&download)
            .await
            .map_err(|source| TransferError::Persist {
                name: download.suggested_name.clone(),
                source,
            })
    }

    /// Open a progress subscription for `id`.
    ///
    /// A fresh subscription starts from the server's current state; nothing
    /// seen by earlier subscriptions is replayed.
    pub async fn subscribe_progress(
        &self,
        id: &TransferId,
    ) -> Result<ProgressChannel, TransferError> {
        let frames = self
            .bounded(
                Operation::Subscribe,
                format!("transfer {id}"),
                self.transport.open_progress(id),
            )
            .await?;
        tracing::debug!("Subscribed to progress of {}", id);
        Ok(ProgressChannel::new(id.clone(), frames))
    }

    /// Fetch the current progress of `id` without subscribing.
    pub async fn query_progress(&self, id: &TransferId) -> Result<TransferProgress, TransferError> {
        self.bounded(
            Operation::PollProgress,
            format!("transfer {id}"),
            self.transport.query_progress(id),
        )
        .await
    }

    /// List a remote directory.
    pub async fn list_directory(
        &self,
        target: &Target,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferError> {
        self.bounded(
            Operation::ListDirectory,
            target,
            self.transport.list_directory(target, path),
        )
        .await
    }

    /// Whether the server can reach `target`.
    pub async fn check_reachable(&self, target: &Target) -> Result<bool, TransferError> {
        self.bounded(
            Operation::CheckReachable,
            target,
            self.transport.check_reachable(target),
        )
        .await
    }

    /// Apply the client deadline to one call. `subject` names the target or
    /// transfer in the resulting `Timeout`.
    async fn bounded<R>(
        &self,
        operation: Operation,
        subject: impl fmt::Display,
        call: impl Future<Output = Result<R, TransferError>>,
    ) -> Result<R, TransferError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| TransferError::Timeout {
                    operation,
                    subject: subject.to_string(),
                    after: limit,
                })?,
            None => call.await,
        }
    }
}
