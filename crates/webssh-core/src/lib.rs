//! Core types for webssh file transfers.
//!
//! This crate holds the data model shared by clients and servers: the opaque
//! target descriptor, transfer ids and progress snapshots, download results,
//! and the JSON envelope the server wraps responses in.

mod file;
mod message;
mod target;
mod transfer;

pub use file::{DownloadResult, PathError, UploadMetadata, final_segment};
pub use message::{ApiResponse, CheckData, DirEntry, SUCCESS, UploadAccepted, endpoint, field};
pub use target::Target;
pub use transfer::{TransferId, TransferIdError, TransferProgress, TransferState};
