//! Registry of in-flight and recently finished uploads.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use webssh_core::{TransferId, TransferProgress};

struct Entry {
    progress: watch::Sender<TransferProgress>,
    finished: Option<Instant>,
}

/// Mints ids and keeps each transfer's latest progress.
///
/// Terminal transfers are forgotten once they have been finished for longer
/// than the retention period; lookups after that report the id as unknown.
pub struct Transfers {
    entries: HashMap<TransferId, Entry>,
    next_id: u64,
    retention: Duration,
}

impl Transfers {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
            retention,
        }
    }

    /// Register a new pending transfer and return the handle its worker
    /// publishes progress through.
    pub fn start(&mut self, total_bytes: u64) -> (TransferId, watch::Sender<TransferProgress>) {
        self.sweep();
        let id = TransferId::new(format!("t{}", self.next_id));
        self.next_id += 1;

        let (tx, _) = watch::channel(TransferProgress::pending(id.clone(), Some(total_bytes)));
        self.entries.insert(
            id.clone(),
            Entry {
                progress: tx.clone(),
                finished: None,
            },
        );
        (id, tx)
    }

    /// Start the retention clock for `id`.
    pub fn finish(&mut self, id: &TransferId) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.finished = Some(Instant::now());
        }
    }

    pub fn snapshot(&mut self, id: &TransferId) -> Option<TransferProgress> {
        self.sweep();
        self.entries
            .get(id)
            .map(|e| e.progress.borrow().clone())
    }

    pub fn subscribe(&mut self, id: &TransferId) -> Option<watch::Receiver<TransferProgress>> {
        self.sweep();
        self.entries.get(id).map(|e| e.progress.subscribe())
    }

    fn sweep(&mut self) {
        let retention = self.retention;
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.finished.is_none_or(|at| at.elapsed() < retention));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!("Forgot {} finished transfers", dropped);
        }
    }
}
