//! Live side of a subscription: the broadcast bus.
//!
//! A [`Broker`] hands out [`LiveSubscription`]s for a topic key. Every
//! payload published to that key after the subscribe call lands on the
//! subscription's bounded inbound queue, in publish order for a single
//! publisher. Dropping the handle unsubscribes.

mod manager;
mod types;

pub use manager::MemoryBroker;
pub use types::{LiveSubscription, SubscriptionId};

use crate::error::Result;
use crate::topic::TopicKey;

/// Subscribe primitive of the broadcast bus.
pub trait Broker: Send + Sync {
    /// Open a subscription for `key` whose inbound queue holds at most
    /// `capacity` payloads. Fails with [`FeedError::Broker`](crate::FeedError::Broker)
    /// when the subscription cannot be established.
    fn subscribe(&self, key: &TopicKey, capacity: usize) -> Result<LiveSubscription>;
}
