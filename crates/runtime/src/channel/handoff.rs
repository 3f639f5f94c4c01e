//! Hand-off channel with optional rendezvous semantics
//!
//! With capacity `0` every `send` completes only after the receiver has taken
//! the value (each value travels with a oneshot acknowledgement). With a
//! positive capacity it behaves as a plain bounded mpsc channel.

use std::fmt;

use tokio::sync::{mpsc, oneshot};

/// Error returned when the other side of the channel is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel closed")]
pub struct ChannelClosed;

struct Envelope<T> {
    value: T,
    ack: Option<oneshot::Sender<()>>,
}

/// Create a hand-off channel
///
/// `capacity == 0` selects rendezvous hand-off.
pub fn handoff<T>(capacity: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        HandoffSender {
            tx,
            rendezvous: capacity == 0,
        },
        HandoffReceiver { rx },
    )
}

/// Sending half of a hand-off channel
pub struct HandoffSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
    rendezvous: bool,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rendezvous: self.rendezvous,
        }
    }
}

impl<T> HandoffSender<T> {
    /// Send a value
    ///
    /// In rendezvous mode this waits until the receiver took the value. The
    /// value is enqueued before that wait, so dropping the future early does
    /// not withdraw it.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] if the receiver was dropped before taking it.
    pub async fn send(&self, value: T) -> Result<(), ChannelClosed> {
        if !self.rendezvous {
            return self
                .tx
                .send(Envelope { value, ack: None })
                .await
                .map_err(|_| ChannelClosed);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                value,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| ChannelClosed)?;

        // The ack sender is dropped unacknowledged if the receiver goes away
        ack_rx.await.map_err(|_| ChannelClosed)
    }

    /// Whether the receiving half has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether this channel uses rendezvous hand-off
    pub fn is_rendezvous(&self) -> bool {
        self.rendezvous
    }
}

impl<T> fmt::Debug for HandoffSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffSender")
            .field("rendezvous", &self.rendezvous)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving half of a hand-off channel
pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
}

impl<T> HandoffReceiver<T> {
    /// Receive the next value, acknowledging it to the sender
    ///
    /// Returns `None` once every sender is dropped and the buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        let envelope = self.rx.recv().await?;
        if let Some(ack) = envelope.ack {
            let _ = ack.send(());
        }
        Some(envelope.value)
    }

    /// Stop accepting new values; buffered values can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl<T> fmt::Debug for HandoffReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffReceiver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_rendezvous_send_waits_for_receiver() {
        let (tx, mut rx) = handoff::<u32>(0);

        let pending = tokio::time::timeout(Duration::from_millis(50), tx.send(1)).await;
        assert!(pending.is_err(), "send must block until the value is taken");

        let sender = tokio::spawn(async move { tx.send(2).await });
        // The timed-out send already enqueued its envelope
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert!(sender.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_buffered_send_does_not_wait() {
        let (tx, mut rx) = handoff::<u32>(2);

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (tx, rx) = handoff::<u32>(0);
        drop(rx);

        assert_eq!(tx.send(1).await, Err(ChannelClosed));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_dropped() {
        let (tx, mut rx) = handoff::<u32>(1);
        tx.send(7).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = handoff::<u32>(0);
        let producer = tokio::spawn(async move {
            for i in 0..10 {
                tx.send(i).await.unwrap();
            }
        });

        let mut received = Vec::new();
        while let Some(v) = rx.recv().await {
            received.push(v);
        }
        producer.await.unwrap();

        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }
}
