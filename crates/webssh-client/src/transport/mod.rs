//! Transport boundary.
//!
//! A transport turns client operations into wire requests and decodes the
//! replies. It holds no business logic and never retries on its own.

mod http;
mod memory;

pub use http::HttpTransport;
pub use memory::MemoryTransport;

use crate::TransferError;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::io;
use std::path::Path;
use tokio_util::io::ReaderStream;
use webssh_core::{DirEntry, Target, TransferId, TransferProgress, UploadMetadata};

/// Raw progress frames as read off a channel.
///
/// The stream ends when the connection closes. An `Err` item means the
/// connection broke.
pub type ProgressFrames = BoxStream<'static, Result<TransferProgress, TransferError>>;

/// Wire operations the transfer client is built on.
pub trait Transport: Send + Sync + 'static {
    /// Send an upload and return the id the server minted for it.
    fn submit_upload(
        &self,
        target: &Target,
        metadata: &UploadMetadata,
        payload: UploadPayload,
    ) -> impl Future<Output = Result<TransferId, TransferError>> + Send;

    /// Fetch the full contents of a remote file.
    fn download(
        &self,
        target: &Target,
        path: &str,
    ) -> impl Future<Output = Result<Bytes, TransferError>> + Send;

    /// Fetch a point-in-time progress snapshot.
    fn query_progress(
        &self,
        id: &TransferId,
    ) -> impl Future<Output = Result<TransferProgress, TransferError>> + Send;

    /// Open a persistent progress channel for `id`.
    fn open_progress(
        &self,
        id: &TransferId,
    ) -> impl Future<Output = Result<ProgressFrames, TransferError>> + Send;

    /// List a remote directory.
    fn list_directory(
        &self,
        target: &Target,
        path: &str,
    ) -> impl Future<Output = Result<Vec<DirEntry>, TransferError>> + Send;

    /// Ask the server whether it can reach `target`.
    fn check_reachable(
        &self,
        target: &Target,
    ) -> impl Future<Output = Result<bool, TransferError>> + Send;
}

/// A finite upload body with a declared length.
pub struct UploadPayload {
    body: PayloadBody,
    len: u64,
}

enum PayloadBody {
    Bytes(Bytes),
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl UploadPayload {
    /// An in-memory payload.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            len: data.len() as u64,
            body: PayloadBody::Bytes(data),
        }
    }

    /// Stream a local file. Its current size is the declared length.
    pub async fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let len = file.metadata().await?.len();
        Ok(Self::from_stream(ReaderStream::new(file), len))
    }

    /// Wrap a chunk stream that yields exactly `len` bytes.
    pub fn from_stream(
        chunks: impl futures_util::Stream<Item = io::Result<Bytes>> + Send + 'static,
        len: u64,
    ) -> Self {
        Self {
            body: PayloadBody::Stream(chunks.boxed()),
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The body as a chunk stream, whatever its source.
    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        match self.body {
            PayloadBody::Bytes(data) => stream::once(async move { Ok(data) }).boxed(),
            PayloadBody::Stream(chunks) => chunks,
        }
    }

    pub(crate) fn into_reqwest_body(self) -> reqwest::Body {
        match self.body {
            PayloadBody::Bytes(data) => reqwest::Body::from(data),
            PayloadBody::Stream(chunks) => reqwest::Body::wrap_stream(chunks),
        }
    }
}

impl std::fmt::Debug for UploadPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.body {
            PayloadBody::Bytes(_) => "bytes",
            PayloadBody::Stream(_) => "stream",
        };
        f.debug_struct("UploadPayload")
            .field("kind", &kind)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn file_payload_declares_size_and_streams_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello upload").unwrap();

        let payload = UploadPayload::from_file(file.path()).await.unwrap();
        assert_eq!(payload.len(), 12);

        let chunks: Vec<Bytes> = payload.into_stream().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello upload");
    }
}
