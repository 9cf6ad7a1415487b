//! Outbound half of a live connection.

use crate::error::BrokerError;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Write side of a device connection.
///
/// A [`LiveSession`](crate::LiveSession) owns exactly one sink and serializes
/// every call through its write lock, so implementations never see concurrent
/// writes.
#[async_trait]
pub trait FrameSink: Send {
    /// Transmit one whole text message.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection. Errors are ignored; the peer may already be gone.
    async fn close(&mut self);
}

/// In-process sink that forwards frames to an unbounded channel.
///
/// Used for embedding the broker behind a custom transport and for tests that
/// play the device side.
pub struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes its frames.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| BrokerError::Transport("channel closed".to_string()))?;
        tx.send(text)
            .map_err(|_| BrokerError::Transport("receiver dropped".to_string()))
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (mut sink, mut rx) = ChannelSink::pair();
        sink.send_text("a".into()).await.unwrap();
        sink.send_text("b".into()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut sink, mut rx) = ChannelSink::pair();
        sink.close().await;
        assert!(matches!(
            sink.send_text("x".into()).await,
            Err(BrokerError::Transport(_))
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_fails() {
        let (mut sink, rx) = ChannelSink::pair();
        drop(rx);
        assert!(sink.send_text("x".into()).await.is_err());
    }
}
