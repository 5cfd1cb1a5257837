//! Reference webssh file server.
//!
//! Serves the file endpoints from a local directory instead of over SSH:
//! each target names a directory below the root, and remote absolute paths
//! resolve inside it. Uploads are accepted immediately and written to disk
//! in the background while progress is published over polling and
//! WebSocket.

mod server;
mod transfers;

pub use server::{ServerConfig, router, run, serve};
