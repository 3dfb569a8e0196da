//! Change stream multiplexer.
//!
//! Fans committed change events out to any number of independent filtered
//! subscribers. `publish` hands each matching event to an unbounded feed
//! dedicated to the subscription, so a writer never waits on a slow consumer;
//! a per-subscription forwarding task drains the feed into the bounded
//! subscriber-visible queue with a non-blocking try-send first, awaiting only
//! when the subscriber is not immediately ready. No event is dropped and
//! per-subscription ordering matches publish order exactly.

use crate::filter::{matcher, Filter};
use crate::types::ChangeEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

/// First-class cancellation signal for a subscription.
///
/// Cloned tokens observe the same state; cancelling any clone cancels all.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token fires (immediately if it already has).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

struct SubscriberEntry {
    filter: Option<Filter>,
    feed: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, SubscriberEntry>,
}

/// Registry of live subscriptions plus the publish fan-out.
#[derive(Clone, Default)]
pub struct ChangeStreams {
    registry: Arc<Mutex<Registry>>,
}

impl ChangeStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filtered subscription and spawn its forwarding task.
    ///
    /// Must be called within a tokio runtime. `queue_capacity` sizes the
    /// subscriber-visible queue; backlog beyond it waits in the unbounded
    /// feed without affecting publishers.
    pub fn subscribe(&self, filter: Option<Filter>, queue_capacity: usize) -> Subscription {
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<ChangeEvent>();
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity.max(1));
        let cancel = CancelToken::new();

        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.subscribers.insert(
                id,
                SubscriberEntry {
                    filter,
                    feed: feed_tx,
                },
            );
            id
        };
        tracing::debug!(subscription = id, "change stream subscribed");

        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = feed_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                match queue_tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            sent = queue_tx.send(event) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            // Buffered undelivered events are discarded with feed_rx.
        });

        Subscription {
            id,
            queue: queue_rx,
            cancel,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Deliver an event to every subscription whose filter matches.
    ///
    /// Never blocks on subscriber drain speed; a send racing a closing
    /// subscription is absorbed and the dead entry is dropped.
    pub fn publish(&self, event: &ChangeEvent) {
        let mut registry = lock(&self.registry);
        registry.subscribers.retain(|id, entry| {
            if !matcher::matches(entry.filter.as_ref(), &event.document) {
                return true;
            }
            match entry.feed.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(subscription = *id, "dropping closed subscription");
                    false
                }
            }
        });
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

fn lock(registry: &Mutex<Registry>) -> std::sync::MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A live, filtered feed of change events.
///
/// The delivery queue belongs to the subscriber; the multiplexer only holds
/// the feeding end and removal never blocks on teardown. Dropping the
/// subscription closes it.
pub struct Subscription {
    id: u64,
    queue: mpsc::Receiver<ChangeEvent>,
    cancel: CancelToken,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    /// Next event, in publish order. `None` after the subscription closes
    /// and the queue drains.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.queue.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.queue.try_recv().ok()
    }

    /// Token that fires when the subscription closes; callers may also fire
    /// it themselves to cancel from another task.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Unregister and stop delivery. Idempotent; buffered undelivered events
    /// are discarded.
    pub fn close(&mut self) {
        self.cancel.cancel();
        lock(&self.registry).subscribers.remove(&self.id);
        tracing::debug!(subscription = self.id, "change stream closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
