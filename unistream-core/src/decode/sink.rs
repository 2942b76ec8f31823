//! Output side of a decode

use crate::decode::error::{DecodeResult, StreamError};
use crate::protocol::StreamEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Destination for stream events
///
/// Owns the only sender of its channel, so the channel closes exactly once:
/// when the sink is dropped. Not `Clone` for that reason.
#[derive(Debug)]
pub struct EventSink {
    tx: Option<mpsc::Sender<StreamEvent>>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Bounded channel sink; returns the consumer's receiver
    pub fn channel(
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                cancel,
            },
            rx,
        )
    }

    /// Sink that discards events but still honors cancellation
    pub fn detached(cancel: CancellationToken) -> Self {
        Self { tx: None, cancel }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_attached(&self) -> bool {
        self.tx.is_some()
    }

    /// Deliver one event, blocking on backpressure until the consumer
    /// receives it or the caller cancels.
    pub async fn send(&self, event: StreamEvent) -> DecodeResult<()> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamError::Cancelled),
            sent = tx.send(event) => sent.map_err(|_| StreamError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detached_sink_accepts_until_cancelled() {
        let cancel = CancellationToken::new();
        let sink = EventSink::detached(cancel.clone());
        assert!(!sink.is_attached());
        sink.send(StreamEvent::End).await.unwrap();

        cancel.cancel();
        assert_eq!(sink.send(StreamEvent::End).await, Err(StreamError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_disconnect() {
        let (sink, rx) = EventSink::channel(1, CancellationToken::new());
        drop(rx);
        assert_eq!(
            sink.send(StreamEvent::End).await,
            Err(StreamError::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_cancel_unblocks_full_channel() {
        let cancel = CancellationToken::new();
        let (sink, mut rx) = EventSink::channel(1, cancel.clone());
        sink.send(StreamEvent::End).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });
        let blocked = sink
            .send(StreamEvent::ContentDelta { text: "x".into() })
            .await;
        assert_eq!(blocked, Err(StreamError::Cancelled));

        drop(sink);
        assert_eq!(rx.recv().await, Some(StreamEvent::End));
        assert_eq!(rx.recv().await, None);
    }
}
