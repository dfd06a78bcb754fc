//! Channel Registry
//!
//! Maps each channel name to the sessions subscribed to it. The registry
//! has its own readers-writer lock, separate from the storage engine's, so
//! pub/sub traffic and key-value traffic never wait on each other.
//!
//! ## Invariants
//!
//! - A channel entry exists only while it has at least one subscriber.
//! - A session appears at most once per channel.
//! - `publish` takes the shared lock and never awaits: a slow subscriber
//!   loses messages, nobody else does.

use crate::connection::session::{Delivery, Outbox, SessionId};
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Per-call outcome of [`PubSubRegistry::publish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose queue accepted the message
    pub delivered: usize,
    /// Subscribers that missed it (queue full or session gone)
    pub dropped: usize,
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct PubSubStats {
    /// Channels with at least one subscriber
    pub channels: u64,
    /// Total PUBLISH calls
    pub published: u64,
    /// Total messages queued for subscribers
    pub delivered: u64,
    /// Total messages dropped because a queue was full or closed
    pub dropped: u64,
}

/// The pub/sub channel registry, shared by all connections.
///
/// # Example
///
/// ```
/// use kvlite::connection::Outbox;
/// use kvlite::pubsub::PubSubRegistry;
///
/// let registry = PubSubRegistry::new();
/// let (outbox, mut rx) = Outbox::channel(registry.next_session_id(), 4);
///
/// registry.subscribe("news", &outbox);
/// let report = registry.publish("news", "hello");
/// assert_eq!(report.delivered, 1);
/// assert_eq!(&rx.try_recv().unwrap()[..], b"hello\n");
/// ```
#[derive(Debug)]
pub struct PubSubRegistry {
    channels: RwLock<HashMap<String, HashMap<SessionId, Outbox>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Default for PubSubRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSubRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Allocates an identifier for a new session.
    pub fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds `outbox` to `channel`, creating the channel on first use.
    ///
    /// Returns `false` if the session was already subscribed.
    pub fn subscribe(&self, channel: &str, outbox: &Outbox) -> bool {
        let mut channels = self.channels.write();
        let subscribers = channels.entry(channel.to_string()).or_default();
        let added = subscribers.insert(outbox.id(), outbox.clone()).is_none();

        trace!(channel, session = %outbox.id(), added, "Subscribe");
        added
    }

    /// Removes `session` from `channel`.
    ///
    /// The channel entry is dropped once its last subscriber leaves.
    /// Returns `false` if the session was not subscribed.
    pub fn unsubscribe(&self, channel: &str, session: SessionId) -> bool {
        let mut channels = self.channels.write();

        let Some(subscribers) = channels.get_mut(channel) else {
            return false;
        };

        let removed = subscribers.remove(&session).is_some();
        if subscribers.is_empty() {
            channels.remove(channel);
        }

        trace!(channel, %session, removed, "Unsubscribe");
        removed
    }

    /// Removes `session` from every channel it belongs to.
    ///
    /// Called when a session ends. Returns the number of channels it left.
    pub fn remove_session(&self, session: SessionId) -> usize {
        let mut channels = self.channels.write();
        let mut left = 0;

        channels.retain(|_, subscribers| {
            if subscribers.remove(&session).is_some() {
                left += 1;
            }
            !subscribers.is_empty()
        });

        if left > 0 {
            debug!(%session, channels = left, "Session removed from channels");
        }
        left
    }

    /// Offers `message` to every current subscriber of `channel`.
    ///
    /// Never blocks: a subscriber whose queue is full misses this message
    /// and the rest are unaffected. Publishing to a channel nobody listens
    /// on is a no-op.
    pub fn publish(&self, channel: &str, message: &str) -> PublishReport {
        self.published.fetch_add(1, Ordering::Relaxed);

        let frame = message_frame(message);
        let mut report = PublishReport::default();

        {
            let channels = self.channels.read();
            if let Some(subscribers) = channels.get(channel) {
                for outbox in subscribers.values() {
                    match outbox.try_deliver(frame.clone()) {
                        Delivery::Queued => report.delivered += 1,
                        Delivery::Full | Delivery::Closed => report.dropped += 1,
                    }
                }
            }
        }

        self.delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
        if report.dropped > 0 {
            self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
            debug!(channel, dropped = report.dropped, "Dropped messages for slow subscribers");
        }

        report
    }

    /// Number of channels that currently have subscribers.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Number of sessions subscribed to `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Returns true if `session` is subscribed to `channel`.
    pub fn is_subscribed(&self, channel: &str, session: SessionId) -> bool {
        self.channels
            .read()
            .get(channel)
            .is_some_and(|subscribers| subscribers.contains_key(&session))
    }

    /// Returns registry statistics.
    pub fn stats(&self) -> PubSubStats {
        PubSubStats {
            channels: self.channel_count() as u64,
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// A published message goes out as its raw text on its own line.
fn message_frame(message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(message.len() + 1);
    buf.put_slice(message.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio_test::{assert_pending, assert_ready, task};

    fn session(
        registry: &PubSubRegistry,
        capacity: usize,
    ) -> (Outbox, tokio::sync::mpsc::Receiver<Bytes>) {
        Outbox::channel(registry.next_session_id(), capacity)
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = PubSubRegistry::new();
        let (outbox, mut rx) = session(&registry, 4);

        assert!(registry.subscribe("news", &outbox));
        assert!(!registry.subscribe("news", &outbox));
        assert_eq!(registry.subscriber_count("news"), 1);

        let report = registry.publish("news", "hello");
        assert_eq!(report, PublishReport { delivered: 1, dropped: 0 });
        assert_eq!(rx.try_recv().unwrap(), Bytes::from("hello\n"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_last_unsubscribe_removes_channel() {
        let registry = PubSubRegistry::new();
        let (a, _rx_a) = session(&registry, 4);
        let (b, _rx_b) = session(&registry, 4);

        registry.subscribe("news", &a);
        registry.subscribe("news", &b);
        assert_eq!(registry.channel_count(), 1);

        assert!(registry.unsubscribe("news", a.id()));
        assert_eq!(registry.channel_count(), 1);
        assert!(registry.unsubscribe("news", b.id()));
        assert_eq!(registry.channel_count(), 0);

        assert_eq!(registry.publish("news", "anyone?"), PublishReport::default());
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let registry = PubSubRegistry::new();
        let (a, _rx) = session(&registry, 4);

        assert!(!registry.unsubscribe("nothing", a.id()));
        registry.subscribe("news", &a);
        assert!(!registry.unsubscribe("news", SessionId::new(999)));
        assert!(registry.is_subscribed("news", a.id()));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let registry = PubSubRegistry::new();
        assert_eq!(registry.publish("void", "hello"), PublishReport::default());
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(registry.stats().published, 1);
    }

    #[test]
    fn test_full_subscriber_does_not_block_others() {
        let registry = PubSubRegistry::new();
        let (slow, _slow_rx) = session(&registry, 1);
        let (fast, mut fast_rx) = session(&registry, 16);

        registry.subscribe("ticks", &slow);
        registry.subscribe("ticks", &fast);

        // Nobody drains the slow queue; it fills after the first message.
        let started = Instant::now();
        for i in 0..10 {
            registry.publish("ticks", &format!("tick {}", i));
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        for i in 0..10 {
            assert_eq!(fast_rx.try_recv().unwrap(), Bytes::from(format!("tick {}\n", i)));
        }

        let stats = registry.stats();
        assert_eq!(stats.delivered, 11);
        assert_eq!(stats.dropped, 9);
    }

    #[test]
    fn test_closed_subscriber_counts_as_dropped() {
        let registry = PubSubRegistry::new();
        let (gone, gone_rx) = session(&registry, 4);
        registry.subscribe("news", &gone);
        drop(gone_rx);

        assert_eq!(
            registry.publish("news", "hello"),
            PublishReport { delivered: 0, dropped: 1 }
        );
    }

    #[test]
    fn test_remove_session_leaves_every_channel() {
        let registry = PubSubRegistry::new();
        let (a, _rx_a) = session(&registry, 4);
        let (b, _rx_b) = session(&registry, 4);

        registry.subscribe("one", &a);
        registry.subscribe("two", &a);
        registry.subscribe("two", &b);

        assert_eq!(registry.remove_session(a.id()), 2);
        assert_eq!(registry.channel_count(), 1);
        assert!(!registry.is_subscribed("two", a.id()));
        assert!(registry.is_subscribed("two", b.id()));
        assert_eq!(registry.remove_session(a.id()), 0);
    }

    #[test]
    fn test_unsubscribed_session_receives_nothing() {
        let registry = PubSubRegistry::new();
        let (listener, mut listener_rx) = session(&registry, 4);
        let (_bystander, mut bystander_rx) = session(&registry, 4);
        registry.subscribe("news", &listener);

        registry.publish("news", "hello");

        let mut bystander = task::spawn(bystander_rx.recv());
        assert_pending!(bystander.poll());

        let mut received = task::spawn(listener_rx.recv());
        let frame = assert_ready!(received.poll());
        assert_eq!(frame, Some(Bytes::from("hello\n")));
    }
}
