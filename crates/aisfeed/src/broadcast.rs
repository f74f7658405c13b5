//! Fan-out of feed messages to live subscribers
//!
//! The recent-message buffer and the active subscriber set live behind one
//! mutex. Publishing appends and delivers under that lock, and registering
//! backfills and inserts under it, so a late joiner sees the buffered
//! messages followed by live ones with no gap and no duplicate.
//!
//! Delivery never blocks: each subscriber has a bounded queue and a
//! subscriber that is closed or full is removed on the spot.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::buffer::RecentMessageBuffer;
use crate::error::DeliveryError;
use crate::message::FeedMessage;
use crate::metrics;

/// Outbound queue depth per subscriber on top of its backfill.
pub const SUBSCRIBER_QUEUE: usize = 256;

pub type SubscriberId = u64;

/// Transport handle for one live subscriber. Owned by the broadcaster for
/// the lifetime of the registration.
pub trait SubscriberSink: Send {
    /// Hand a message to the subscriber without waiting.
    fn deliver(&mut self, msg: &FeedMessage) -> Result<(), DeliveryError>;
}

struct ChannelSink {
    tx: mpsc::Sender<FeedMessage>,
}

impl SubscriberSink for ChannelSink {
    fn deliver(&mut self, msg: &FeedMessage) -> Result<(), DeliveryError> {
        self.tx.try_send(msg.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

struct Hub {
    buffer: RecentMessageBuffer,
    subscribers: HashMap<SubscriberId, Box<dyn SubscriberSink>>,
}

impl Hub {
    fn deliver(&mut self, msg: &FeedMessage) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|id, sink| match sink.deliver(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!(subscriber = id, error = %e, "Delivery failed, removing subscriber");
                metrics::record_subscriber_dropped(&e);
                false
            }
        });
        if self.subscribers.len() != before {
            metrics::set_subscribers(self.subscribers.len());
        }
        self.subscribers.len()
    }
}

pub struct Broadcaster {
    hub: Mutex<Hub>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            hub: Mutex::new(Hub {
                buffer: RecentMessageBuffer::new(buffer_capacity),
                subscribers: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffer the message, then deliver it to every subscriber.
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, msg: FeedMessage) -> usize {
        let mut hub = self.lock();
        hub.buffer.append(msg.clone());
        hub.deliver(&msg)
    }

    /// Deliver to every subscriber without buffering. Failed subscribers are
    /// removed; the call itself never fails.
    pub fn broadcast(&self, msg: &FeedMessage) -> usize {
        self.lock().deliver(msg)
    }

    /// Add a subscriber after replaying up to `backfill` buffered messages,
    /// oldest first. A subscriber that fails during backfill is not added.
    pub fn register(
        &self,
        mut sink: Box<dyn SubscriberSink>,
        backfill: usize,
    ) -> Result<SubscriberId, DeliveryError> {
        let mut hub = self.lock();
        for msg in hub.buffer.latest(backfill) {
            sink.deliver(&msg)?;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        hub.subscribers.insert(id, sink);
        metrics::set_subscribers(hub.subscribers.len());
        debug!(subscriber = id, backfill, "Subscriber registered");
        Ok(id)
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut hub = self.lock();
        let removed = hub.subscribers.remove(&id).is_some();
        if removed {
            metrics::set_subscribers(hub.subscribers.len());
            debug!(subscriber = id, "Subscriber unregistered");
        }
        removed
    }

    /// Register a channel-backed subscriber. Dropping the returned
    /// `Subscription` unregisters it.
    pub fn subscribe(self: &Arc<Self>, backfill: usize) -> Subscription {
        let backfill = backfill.min(self.lock().buffer.capacity());
        let (tx, rx) = mpsc::channel(backfill + SUBSCRIBER_QUEUE);
        let id = match self.register(Box::new(ChannelSink { tx }), backfill) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "Subscriber failed during backfill");
                None
            }
        };
        Subscription {
            id,
            rx,
            broadcaster: Arc::clone(self),
        }
    }

    /// The `n` most recent buffered messages, oldest first.
    pub fn latest(&self, n: usize) -> Vec<FeedMessage> {
        self.lock().buffer.latest(n)
    }

    pub fn buffer_len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.lock().subscribers.contains_key(&id)
    }
}

/// Receiving end of a channel-backed subscriber.
pub struct Subscription {
    id: Option<SubscriberId>,
    rx: mpsc::Receiver<FeedMessage>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    pub fn id(&self) -> Option<SubscriberId> {
        self.id
    }

    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FeedMessage> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = FeedMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.broadcaster.unregister(id);
        }
    }
}
