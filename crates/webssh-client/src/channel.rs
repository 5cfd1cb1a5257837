//! Progress channel state machine.
//!
//! A [`ProgressChannel`] wraps the raw frames of one subscription and turns
//! them into exactly one of three outcomes per read: a progress event, the
//! terminal event (after which the channel is closed), or a lost
//! connection.
//!
//! ```text
//! Open ──first event──▶ Streaming ──terminal event──▶ Closed(state)
//!   │                       │
//!   └──────connection lost──┴──────────────────────▶ ClosedWithError
//! ```
//!
//! Dropping a channel only releases the local connection. The remote
//! transfer keeps running.

use crate::transport::ProgressFrames;
use crate::{Operation, TransferError};
use futures_util::stream::{FusedStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use webssh_core::{TransferId, TransferProgress, TransferState};

/// Where a subscription stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Subscribed, nothing received yet.
    Open,
    /// At least one non-terminal event received.
    Streaming,
    /// A terminal event was delivered.
    Closed(TransferState),
    /// The connection dropped before a terminal event.
    ClosedWithError,
}

impl ChannelState {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed(_) | Self::ClosedWithError)
    }
}

/// A live subscription to one transfer's progress.
///
/// Yields `bytesTransferred`-monotonic events and ends right after the
/// terminal one. Each channel owns its connection exclusively.
pub struct ProgressChannel {
    id: TransferId,
    state: ChannelState,
    frames: Option<ProgressFrames>,
    high_water: u64,
    delivered: u64,
    terminal: Option<TransferProgress>,
}

impl ProgressChannel {
    pub(crate) fn new(id: TransferId, frames: ProgressFrames) -> Self {
        Self {
            id,
            state: ChannelState::Open,
            frames: Some(frames),
            high_water: 0,
            delivered: 0,
            terminal: None,
        }
    }

    pub fn id(&self) -> &TransferId {
        &self.id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Number of events handed to the consumer so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Read the next event, waiting at most `limit`.
    ///
    /// On expiry this yields `Timeout` and leaves the channel open, so the
    /// read can be retried.
    pub async fn next_within(
        &mut self,
        limit: Duration,
    ) -> Option<Result<TransferProgress, TransferError>> {
        match tokio::time::timeout(limit, self.next()).await {
            Ok(item) => item,
            Err(_) => Some(Err(TransferError::Timeout {
                operation: Operation::Subscribe,
                subject: format!("transfer {}", self.id),
                after: limit,
            })),
        }
    }

    /// Drain the channel and return the terminal event, including one that
    /// was already read through [`next`](StreamExt::next).
    pub async fn wait_terminal(mut self) -> Result<TransferProgress, TransferError> {
        while let Some(event) = self.next().await {
            event?;
        }
        match self.terminal.take() {
            Some(terminal) => Ok(terminal),
            None => Err(self.lost("channel already closed")),
        }
    }

    /// Filter and record a raw frame. `None` means the frame is discarded.
    fn accept(&mut self, mut frame: TransferProgress) -> Option<TransferProgress> {
        if frame.id != self.id {
            tracing::warn!(
                "Discarding progress frame for {} on channel for {}",
                frame.id,
                self.id
            );
            return None;
        }

        if frame.is_terminal() {
            frame.bytes_transferred = frame.bytes_transferred.max(self.high_water);
            self.high_water = frame.bytes_transferred;
            self.state = ChannelState::Closed(frame.state);
            self.frames = None;
            self.delivered += 1;
            self.terminal = Some(frame.clone());
            tracing::info!(
                "Transfer {} {} at {} bytes",
                self.id,
                frame.state,
                frame.bytes_transferred
            );
            return Some(frame);
        }

        if frame.bytes_transferred < self.high_water {
            tracing::warn!(
                "Discarding regressing progress for {}: {} < {}",
                self.id,
                frame.bytes_transferred,
                self.high_water
            );
            return None;
        }

        self.high_water = frame.bytes_transferred;
        if self.state == ChannelState::Open {
            tracing::debug!("Progress channel for {} streaming", self.id);
            self.state = ChannelState::Streaming;
        }
        self.delivered += 1;
        Some(frame)
    }

    fn lost(&mut self, reason: impl Into<String>) -> TransferError {
        let reason = reason.into();
        tracing::debug!("Progress channel for {} lost: {}", self.id, reason);
        self.state = ChannelState::ClosedWithError;
        self.frames = None;
        TransferError::ConnectionLost {
            id: self.id.clone(),
            events: self.delivered,
            reason,
        }
    }
}

impl Stream for ProgressChannel {
    type Item = Result<TransferProgress, TransferError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(frames) = this.frames.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(frames.poll_next_unpin(cx)) {
                Some(Ok(frame)) => {
                    if let Some(event) = this.accept(frame) {
                        return Poll::Ready(Some(Ok(event)));
                    }
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(this.lost(e.to_string())))),
                None => {
                    let lost = this.lost("connection closed before a terminal state");
                    return Poll::Ready(Some(Err(lost)));
                }
            }
        }
    }
}

impl FusedStream for ProgressChannel {
    fn is_terminated(&self) -> bool {
        self.frames.is_none()
    }
}

impl Drop for ProgressChannel {
    fn drop(&mut self) {
        if self.frames.is_some() {
            tracing::debug!(
                "Progress subscription for {} abandoned; transfer continues remotely",
                self.id
            );
        }
    }
}

impl std::fmt::Debug for ProgressChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressChannel")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("delivered", &self.delivered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn frame(bytes: u64, state: TransferState) -> TransferProgress {
        TransferProgress {
            id: TransferId::new("t1"),
            bytes_transferred: bytes,
            total_bytes: Some(100),
            state,
            message: None,
        }
    }

    fn channel(frames: Vec<Result<TransferProgress, TransferError>>) -> ProgressChannel {
        ProgressChannel::new(TransferId::new("t1"), stream::iter(frames).boxed())
    }

    #[tokio::test]
    async fn closes_after_terminal_event() {
        let mut ch = channel(vec![
            Ok(frame(10, TransferState::InProgress)),
            Ok(frame(100, TransferState::Completed)),
            Ok(frame(100, TransferState::InProgress)),
        ]);
        assert_eq!(ch.state(), ChannelState::Open);

        assert_eq!(ch.next().await.unwrap().unwrap().bytes_transferred, 10);
        assert_eq!(ch.state(), ChannelState::Streaming);

        let last = ch.next().await.unwrap().unwrap();
        assert_eq!(last.state, TransferState::Completed);
        assert_eq!(ch.state(), ChannelState::Closed(TransferState::Completed));
        assert!(ch.is_terminated());
        assert!(ch.next().await.is_none());
    }

    #[tokio::test]
    async fn early_close_is_connection_lost_not_failed() {
        let mut ch = channel(vec![
            Ok(frame(1, TransferState::InProgress)),
            Ok(frame(2, TransferState::InProgress)),
            Ok(frame(3, TransferState::InProgress)),
        ]);
        for _ in 0..3 {
            ch.next().await.unwrap().unwrap();
        }
        let err = ch.next().await.unwrap().unwrap_err();
        assert!(matches!(err, TransferError::ConnectionLost { events: 3, .. }));
        assert!(err.is_retryable());
        assert_eq!(ch.state(), ChannelState::ClosedWithError);
        assert!(ch.next().await.is_none());
    }

    #[tokio::test]
    async fn failed_transfer_is_a_normal_terminal_event() {
        let mut failed = frame(40, TransferState::Failed);
        failed.message = Some("disk full".to_string());
        let ch = channel(vec![Ok(frame(40, TransferState::InProgress)), Ok(failed)]);

        let last = ch.wait_terminal().await.unwrap();
        assert_eq!(last.state, TransferState::Failed);
        assert_eq!(last.message.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn wait_terminal_after_reading_the_terminal_event() {
        let mut ch = channel(vec![
            Ok(frame(30, TransferState::InProgress)),
            Ok(frame(100, TransferState::Completed)),
        ]);
        while let Some(event) = ch.next().await {
            event.unwrap();
        }
        assert_eq!(ch.state(), ChannelState::Closed(TransferState::Completed));

        let last = ch.wait_terminal().await.unwrap();
        assert_eq!(last.state, TransferState::Completed);
        assert_eq!(last.bytes_transferred, 100);
    }

    #[tokio::test]
    async fn wait_terminal_after_a_lost_connection_stays_lost() {
        let mut ch = channel(vec![Ok(frame(30, TransferState::InProgress))]);
        ch.next().await.unwrap().unwrap();
        ch.next().await.unwrap().unwrap_err();

        let err = ch.wait_terminal().await.unwrap_err();
        assert!(matches!(err, TransferError::ConnectionLost { events: 1, .. }));
    }

    #[tokio::test]
    async fn transport_error_mid_stream_is_connection_lost() {
        let mut ch = channel(vec![
            Ok(frame(5, TransferState::InProgress)),
            Err(TransferError::transport(Operation::Subscribe, "transfer t1", "reset")),
        ]);
        ch.next().await.unwrap().unwrap();
        let err = ch.next().await.unwrap().unwrap_err();
        assert!(matches!(err, TransferError::ConnectionLost { events: 1, .. }));
    }

    #[tokio::test]
    async fn regressions_and_foreign_frames_are_discarded() {
        let mut foreign = frame(99, TransferState::InProgress);
        foreign.id = TransferId::new("t2");
        let events: Vec<_> = channel(vec![
            Ok(frame(50, TransferState::InProgress)),
            Ok(frame(20, TransferState::InProgress)),
            Ok(foreign),
            Ok(frame(60, TransferState::InProgress)),
            Ok(frame(30, TransferState::Completed)),
        ])
        .map(|e| e.unwrap().bytes_transferred)
        .collect()
        .await;
        assert_eq!(events, vec![50, 60, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_leaves_channel_open() {
        let slow = stream::iter(vec![Ok::<_, TransferError>(frame(100, TransferState::Completed))])
            .then(|f| async move {
                tokio::time::sleep(Duration::from_secs(8)).await;
                f
            });
        let mut ch = ProgressChannel::new(TransferId::new("t1"), slow.boxed());

        let err = ch
            .next_within(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, TransferError::Timeout { .. }));
        assert_eq!(ch.state(), ChannelState::Open);

        let last = ch.next_within(Duration::from_secs(5)).await.unwrap().unwrap();
        assert!(last.is_terminal());
        assert_eq!(ch.state(), ChannelState::Closed(TransferState::Completed));
    }
}
