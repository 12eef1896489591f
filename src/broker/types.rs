//! Live subscription handle.

use crate::topic::TopicKey;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fmt;
use std::time::Duration;

/// Unique identifier for a live subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

type ReleaseHook = Box<dyn FnOnce(SubscriptionId) + Send>;

/// An open subscription on the broadcast bus.
///
/// Owns the inbound queue of raw payloads. Dropping the handle releases the
/// underlying subscription.
pub struct LiveSubscription {
    id: SubscriptionId,
    key: TopicKey,
    receiver: Receiver<Vec<u8>>,
    release: Option<ReleaseHook>,
}

impl LiveSubscription {
    /// Wrap a receiver; `release` runs exactly once when the handle drops.
    pub fn new<F>(id: SubscriptionId, key: TopicKey, receiver: Receiver<Vec<u8>>, release: F) -> Self
    where
        F: FnOnce(SubscriptionId) + Send + 'static,
    {
        Self {
            id,
            key,
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn key(&self) -> &TopicKey {
        &self.key
    }

    /// Inbound payload queue. Reports disconnected once the bus ends the
    /// subscription and the buffered payloads are drained.
    pub fn receiver(&self) -> &Receiver<Vec<u8>> {
        &self.receiver
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl fmt::Debug for LiveSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSubscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("buffered", &self.receiver.len())
            .finish()
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}
