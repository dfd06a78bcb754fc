//! Session Outbound Delivery
//!
//! Every session owns one bounded queue of outgoing frames and one task
//! that drains it onto the socket.
//!
//! ```text
//!   command replies ── send().await ──┐
//!                                     ├──> [ bounded mpsc ] ──> delivery task ──> socket
//!   PUBLISH fan-out ── try_deliver() ─┘       (capacity N)        (FIFO, one writer)
//! ```
//!
//! Publishers only ever use [`Outbox::try_deliver`], which never waits: when
//! the queue is full the frame is dropped for this session only. Replies use
//! [`Outbox::send`], which waits for room, so a reply is never lost and the
//! wait is confined to the session that issued the command.

use crate::connection::handler::ConnectionStats;
use bytes::Bytes;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::trace;

/// Default number of frames a session may have queued.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Identifies one connected session for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        SessionId(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame is queued for the delivery task
    Queued,
    /// The queue was at capacity; the frame was dropped
    Full,
    /// The session is gone; the frame was dropped
    Closed,
}

/// The session's delivery task has stopped, so nothing more can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session outbox closed")]
pub struct OutboxClosed;

/// Sending side of a session's outbound queue.
///
/// Cheap to clone; the registry holds one clone per subscribed channel.
#[derive(Debug, Clone)]
pub struct Outbox {
    id: SessionId,
    tx: mpsc::Sender<Bytes>,
}

impl Outbox {
    /// Creates an outbox with room for `capacity` frames (at least one).
    pub fn channel(id: SessionId, capacity: usize) -> (Outbox, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Outbox { id, tx }, rx)
    }

    /// The session this outbox belongs to.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Enqueues `frame` without waiting.
    pub fn try_deliver(&self, frame: Bytes) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Enqueues `frame`, waiting for room if the queue is full.
    pub async fn send(&self, frame: Bytes) -> Result<(), OutboxClosed> {
        self.tx.send(frame).await.map_err(|_| OutboxClosed)
    }

    /// Completes once the delivery side has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Returns true if the delivery side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawns the delivery task for one session.
///
/// The task writes frames in the order they were queued and flushes once
/// the queue is momentarily empty. It ends after draining when every
/// [`Outbox`] clone has been dropped, or on the first write error.
pub fn spawn_delivery<W>(
    writer: W,
    frames: mpsc::Receiver<Bytes>,
    stats: Arc<ConnectionStats>,
) -> JoinHandle<io::Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(delivery_loop(writer, frames, stats))
}

async fn delivery_loop<W>(
    mut writer: W,
    mut frames: mpsc::Receiver<Bytes>,
    stats: Arc<ConnectionStats>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        writer.write_all(&frame).await?;
        stats.bytes_written(frame.len());

        // Batch up whatever is already waiting before paying for a flush.
        while let Ok(frame) = frames.try_recv() {
            writer.write_all(&frame).await?;
            stats.bytes_written(frame.len());
        }

        writer.flush().await?;
        trace!("Flushed outbound frames");
    }

    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_delivers_in_enqueue_order() {
        let (client, server) = tokio::io::duplex(1024);
        let (outbox, rx) = Outbox::channel(SessionId::new(1), 8);
        let stats = Arc::new(ConnectionStats::new());
        let task = spawn_delivery(server, rx, Arc::clone(&stats));

        outbox.send(Bytes::from("> OK\n")).await.unwrap();
        assert_eq!(outbox.try_deliver(Bytes::from("one\n")), Delivery::Queued);
        assert_eq!(outbox.try_deliver(Bytes::from("two\n")), Delivery::Queued);
        drop(outbox);

        task.await.unwrap().unwrap();

        let mut client = client;
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "> OK\none\ntwo\n");
        assert_eq!(
            stats.bytes_written.load(std::sync::atomic::Ordering::Relaxed),
            out.len() as u64
        );
    }

    #[tokio::test]
    async fn test_try_deliver_drops_when_full() {
        let (outbox, mut rx) = Outbox::channel(SessionId::new(1), 2);

        assert_eq!(outbox.try_deliver(Bytes::from("a\n")), Delivery::Queued);
        assert_eq!(outbox.try_deliver(Bytes::from("b\n")), Delivery::Queued);
        assert_eq!(outbox.try_deliver(Bytes::from("c\n")), Delivery::Full);

        assert_eq!(rx.recv().await.unwrap(), Bytes::from("a\n"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from("b\n"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_try_deliver_after_close() {
        let (outbox, rx) = Outbox::channel(SessionId::new(7), 2);
        drop(rx);

        assert!(outbox.is_closed());
        assert_eq!(outbox.try_deliver(Bytes::from("x\n")), Delivery::Closed);
        assert_eq!(outbox.send(Bytes::from("x\n")).await, Err(OutboxClosed));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (outbox, _rx) = Outbox::channel(SessionId::new(1), 0);
        assert_eq!(outbox.try_deliver(Bytes::from("a\n")), Delivery::Queued);
        assert_eq!(outbox.try_deliver(Bytes::from("b\n")), Delivery::Full);
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId::new(42).to_string(), "#42");
    }
}
