//! Per-recipient push channel.
//!
//! Fan-out of job lifecycle events to however many live streams a
//! recipient has open. Delivery is best-effort: a failed send drops the
//! offending stream and nothing else. Senders never block - streams are
//! unbounded channels drained by the transport layer.

pub mod event;

pub use event::PushEvent;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

struct Stream {
    id: u64,
    tx: mpsc::UnboundedSender<PushEvent>,
}

/// Registry of live streams keyed by recipient identifier.
///
/// The lock is only held to walk the registry; sends are non-blocking, so
/// workers publishing progress never wait on a slow client.
#[derive(Default)]
pub struct PushHub {
    streams: Mutex<HashMap<String, Vec<Stream>>>,
    next_stream_id: AtomicU64,
}

/// A live stream handle. Dropping the receiver is how a disconnect
/// manifests; the registry entry is pruned on the next failed send or on
/// explicit `unsubscribe`.
pub struct PushSubscription {
    pub stream_id: u64,
    pub receiver: mpsc::UnboundedReceiver<PushEvent>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a stream for a recipient. Multiple concurrent streams per
    /// recipient are permitted.
    pub fn subscribe(&self, recipient: &str) -> PushSubscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let mut streams = self.streams.lock().expect("push registry lock poisoned");
        streams
            .entry(recipient.to_string())
            .or_default()
            .push(Stream { id: stream_id, tx });
        debug!(recipient, stream_id, "push stream opened");
        PushSubscription {
            stream_id,
            receiver,
        }
    }

    /// Remove one stream. Safe to call for a stream already pruned.
    pub fn unsubscribe(&self, recipient: &str, stream_id: u64) {
        let mut streams = self.streams.lock().expect("push registry lock poisoned");
        if let Some(list) = streams.get_mut(recipient) {
            list.retain(|s| s.id != stream_id);
            if list.is_empty() {
                streams.remove(recipient);
            }
        }
        debug!(recipient, stream_id, "push stream closed");
    }

    /// Best-effort fan-out to all live streams of one recipient.
    pub fn publish(&self, recipient: &str, event: PushEvent) {
        let mut streams = self.streams.lock().expect("push registry lock poisoned");
        if let Some(list) = streams.get_mut(recipient) {
            list.retain(|s| s.tx.send(event.clone()).is_ok());
            if list.is_empty() {
                streams.remove(recipient);
            }
        }
    }

    /// Best-effort fan-out to every live stream.
    pub fn broadcast(&self, event: PushEvent) {
        let mut streams = self.streams.lock().expect("push registry lock poisoned");
        streams.retain(|_, list| {
            list.retain(|s| s.tx.send(event.clone()).is_ok());
            !list.is_empty()
        });
    }

    /// Total live streams across all recipients.
    pub fn stream_count(&self) -> usize {
        let streams = self.streams.lock().expect("push registry lock poisoned");
        streams.values().map(Vec::len).sum()
    }

    /// Recipients with at least one live stream.
    pub fn recipient_count(&self) -> usize {
        self.streams
            .lock()
            .expect("push registry lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u64) -> PushEvent {
        PushEvent::JobFailed {
            job_id: uuid::Uuid::nil(),
            message: format!("event {n}"),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_streams_of_recipient() {
        let hub = PushHub::new();
        let mut a1 = hub.subscribe("a@example.com");
        let mut a2 = hub.subscribe("a@example.com");
        let mut b = hub.subscribe("b@example.com");

        hub.publish("a@example.com", event(1));

        assert!(a1.receiver.try_recv().is_ok());
        assert!(a2.receiver.try_recv().is_ok());
        assert!(b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_stream_is_pruned_on_publish() {
        let hub = PushHub::new();
        let sub = hub.subscribe("a@example.com");
        let mut live = hub.subscribe("a@example.com");
        assert_eq!(hub.stream_count(), 2);

        drop(sub.receiver);
        hub.publish("a@example.com", event(1));

        assert_eq!(hub.stream_count(), 1);
        assert!(live.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_stream() {
        let hub = PushHub::new();
        let sub = hub.subscribe("a@example.com");
        assert_eq!(hub.stream_count(), 1);
        assert_eq!(hub.recipient_count(), 1);

        hub.unsubscribe("a@example.com", sub.stream_id);
        assert_eq!(hub.stream_count(), 0);
        assert_eq!(hub.recipient_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let hub = PushHub::new();
        let mut a = hub.subscribe("a@example.com");
        let mut b = hub.subscribe("b@example.com");

        hub.broadcast(event(1));

        assert!(a.receiver.try_recv().is_ok());
        assert!(b.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_per_stream_ordering_preserved() {
        let hub = PushHub::new();
        let mut sub = hub.subscribe("a@example.com");

        for n in 0..10 {
            hub.publish("a@example.com", event(n));
        }

        for n in 0..10 {
            match sub.receiver.try_recv().unwrap() {
                PushEvent::JobFailed { message, .. } => {
                    assert_eq!(message, format!("event {n}"));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
