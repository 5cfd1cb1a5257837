//! Client for webssh remote file transfers.
//!
//! [`TransferClient`] submits uploads, fetches downloads, lists remote
//! directories and follows transfer progress. Uploads return a
//! [`TransferId`] as soon as the server accepts them; the remote side keeps
//! working afterwards and reports progress through a [`ProgressChannel`].
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use webssh_client::{ClientConfig, Target, TransferClient, UploadMetadata, UploadPayload};
//!
//! let config = ClientConfig::new("http://127.0.0.1:8080")?.with_prefix("webssh");
//! let client = TransferClient::connect(config)?;
//! let target = Target::labeled("<encoded ssh info>", "build-box");
//!
//! let id = client
//!     .submit_upload(
//!         &target,
//!         &UploadMetadata::new("/tmp", "notes.txt"),
//!         UploadPayload::from_bytes("hello"),
//!     )
//!     .await?;
//! let outcome = client.subscribe_progress(&id).await?.wait_terminal().await?;
//! println!("{} {}", id, outcome.state);
//! # Ok(())
//! # }
//! ```

mod channel;
mod client;
mod config;
mod error;
mod sink;
pub mod transport;

pub use channel::{ChannelState, ProgressChannel};
pub use client::TransferClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{Operation, TransferError};
pub use sink::{DirectorySink, DownloadSink};
pub use transport::{HttpTransport, MemoryTransport, ProgressFrames, Transport, UploadPayload};

pub use webssh_core::{
    DirEntry, DownloadResult, PathError, Target, TransferId, TransferProgress, TransferState,
    UploadMetadata,
};
