//! Worker-side ends of the duplex channel pair
//!
//! - [`InputStream`] yields the values the caller sends
//! - [`Responder`] emits stream items and turn boundaries to the caller

use futures::Stream;
use tokio_util::sync::CancellationToken;

use super::handoff::{HandoffReceiver, HandoffSender};
use crate::error::{BidiError, Result};

/// Frame travelling on the outbound channel
///
/// `EndOfTurn` is consumed by `receive()` and never surfaced as an item.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<S> {
    /// A stream item for the caller
    Item(S),
    /// The worker finished responding to the current input
    EndOfTurn,
}

/// Inbound values as seen by the worker
///
/// Ends (returns `None`) when the caller closes the connection, drops it, or
/// the connection is cancelled. Use [`ActionContext::is_cancelled`](crate::ActionContext::is_cancelled)
/// to tell cancellation from a normal close.
#[derive(Debug)]
pub struct InputStream<I> {
    rx: HandoffReceiver<I>,
    cancel: CancellationToken,
    received: usize,
}

impl<I> InputStream<I> {
    pub(crate) fn new(rx: HandoffReceiver<I>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            cancel,
            received: 0,
        }
    }

    /// Wait for the next input value
    pub async fn next(&mut self) -> Option<I> {
        let value = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            value = self.rx.recv() => value,
        };
        if value.is_some() {
            self.received += 1;
        }
        value
    }

    /// Number of values received so far
    pub fn received(&self) -> usize {
        self.received
    }

    /// Adapt into a [`futures::Stream`]
    pub fn into_stream(self) -> impl Stream<Item = I> {
        futures::stream::unfold(self, |mut inputs| async move {
            inputs.next().await.map(|value| (value, inputs))
        })
    }
}

/// Output sink handed to the worker
///
/// `send` emits one stream item; `end_turn` marks the end of the response to
/// the current input without closing the connection. Both wait for the caller
/// to read the frame when the channel is unbuffered.
///
/// Cloning is allowed so concurrent tool tasks can stream; the outbound
/// stream closes once every clone is dropped.
#[derive(Debug)]
pub struct Responder<S> {
    tx: HandoffSender<Frame<S>>,
    cancel: CancellationToken,
}

impl<S> Clone for Responder<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S> Responder<S> {
    pub(crate) fn new(tx: HandoffSender<Frame<S>>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Emit one stream item
    ///
    /// # Errors
    ///
    /// - [`BidiError::Cancelled`] if the connection was cancelled
    /// - [`BidiError::ConnectionClosed`] if the caller dropped the connection
    pub async fn send(&self, item: S) -> Result<()> {
        self.deliver(Frame::Item(item)).await
    }

    /// Mark the end of the current turn
    pub async fn end_turn(&self) -> Result<()> {
        self.deliver(Frame::EndOfTurn).await
    }

    /// Whether the caller side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn deliver(&self, frame: Frame<S>) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BidiError::Cancelled),
            sent = self.tx.send(frame) => sent.map_err(|_| BidiError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::channel::handoff;

    #[tokio::test]
    async fn test_input_stream_counts_values() {
        let (tx, rx) = handoff::<&'static str>(4);
        let mut inputs = InputStream::new(rx, CancellationToken::new());

        tx.send("a").await.unwrap();
        tx.send("b").await.unwrap();
        drop(tx);

        assert_eq!(inputs.next().await, Some("a"));
        assert_eq!(inputs.next().await, Some("b"));
        assert_eq!(inputs.next().await, None);
        assert_eq!(inputs.received(), 2);
    }

    #[tokio::test]
    async fn test_input_stream_ends_on_cancel() {
        let (_tx, rx) = handoff::<u32>(0);
        let token = CancellationToken::new();
        let mut inputs = InputStream::new(rx, token.clone());

        token.cancel();
        let next = tokio::time::timeout(Duration::from_secs(1), inputs.next())
            .await
            .expect("cancellation must unblock next()");
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let (tx, rx) = handoff::<u32>(3);
        for i in 1..=3 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let values: Vec<u32> = InputStream::new(rx, CancellationToken::new())
            .into_stream()
            .collect()
            .await;
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_responder_frames() {
        let (tx, mut rx) = handoff::<Frame<u32>>(4);
        let responder = Responder::new(tx, CancellationToken::new());

        responder.send(1).await.unwrap();
        responder.end_turn().await.unwrap();

        assert_eq!(rx.recv().await, Some(Frame::Item(1)));
        assert_eq!(rx.recv().await, Some(Frame::EndOfTurn));
    }

    #[tokio::test]
    async fn test_responder_cancelled_while_blocked() {
        let (tx, _rx) = handoff::<Frame<u32>>(0);
        let token = CancellationToken::new();
        let responder = Responder::new(tx, token.clone());

        let blocked = tokio::spawn(async move { responder.send(1).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("cancel must unblock send")
            .unwrap();
        assert!(matches!(result, Err(BidiError::Cancelled)));
    }

    #[tokio::test]
    async fn test_responder_closed_when_receiver_dropped() {
        let (tx, rx) = handoff::<Frame<u32>>(0);
        let responder = Responder::new(tx, CancellationToken::new());
        drop(rx);

        assert!(matches!(
            responder.send(1).await,
            Err(BidiError::ConnectionClosed)
        ));
    }
}
