//! In-process broadcast bus.

use super::types::{LiveSubscription, SubscriptionId};
use super::Broker;
use crate::error::{FeedError, Result};
use crate::topic::TopicKey;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Internal subscriber state.
struct Subscriber {
    key: TopicKey,
    sender: Sender<Vec<u8>>,
}

#[derive(Default)]
struct Registry {
    /// Active subscribers by ID.
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, id: SubscriptionId) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }
}

/// Broadcast bus that fans payloads out to subscribers of a topic key.
///
/// Each subscriber has a bounded queue. A full queue stalls the publisher
/// until the subscriber reads or goes away; payloads are never dropped for a
/// live subscriber.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    registry: Arc<Registry>,
}

impl MemoryBroker {
    /// Create a new broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a payload to every subscriber of `key`, in subscription order.
    ///
    /// Blocks while a subscriber's queue is full. Returns the number of
    /// subscribers that accepted the payload.
    pub fn publish(&self, key: &TopicKey, payload: Vec<u8>) -> usize {
        // Senders are cloned out so a blocked send never holds the registry
        // lock the release hook needs.
        let mut targets: Vec<(SubscriptionId, Sender<Vec<u8>>)> = self
            .registry
            .subscribers
            .read()
            .iter()
            .filter(|(_, sub)| &sub.key == key)
            .map(|(id, sub)| (*id, sub.sender.clone()))
            .collect();
        targets.sort_by_key(|(id, _)| id.0);

        let mut delivered = 0;
        let mut to_remove = Vec::new();

        for (id, sender) in targets {
            if sender.is_full() {
                debug!(subscription = id.0, key = %key, "subscriber queue full, waiting");
            }
            match sender.send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    debug!(subscription = id.0, key = %key, "pruning disconnected subscriber");
                    to_remove.push(id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.registry.subscribers.write();
            for id in to_remove {
                subs.remove(&id);
            }
        }

        delivered
    }

    /// Remove a subscription. Its receiver reports disconnected once drained.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.remove(id)
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.registry.subscribers.read().len()
    }

    /// Subscriptions currently attached to `key`.
    pub fn subscription_count_for(&self, key: &TopicKey) -> usize {
        self.registry
            .subscribers
            .read()
            .values()
            .filter(|sub| &sub.key == key)
            .count()
    }
}

impl Broker for MemoryBroker {
    fn subscribe(&self, key: &TopicKey, capacity: usize) -> Result<LiveSubscription> {
        if capacity == 0 {
            return Err(FeedError::Broker(format!(
                "cannot subscribe to {key} with zero capacity"
            )));
        }

        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (sender, receiver) = bounded(capacity);

        self.registry.subscribers.write().insert(
            id,
            Subscriber {
                key: key.clone(),
                sender,
            },
        );
        debug!(subscription = id.0, key = %key, capacity, "live subscription opened");

        let registry: Weak<Registry> = Arc::downgrade(&self.registry);
        Ok(LiveSubscription::new(id, key.clone(), receiver, move |id| {
            if let Some(registry) = registry.upgrade() {
                if registry.remove(id) {
                    debug!(subscription = id.0, "live subscription released");
                }
            }
        }))
    }
}
