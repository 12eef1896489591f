//! Feed request and lifecycle types.

use crate::types::{ChangeId, Channel};
use std::time::{Duration, Instant};

/// One subscription call.
#[derive(Clone, Debug)]
pub struct SubscriptionRequest {
    pub channel: Channel,

    /// Partition within the channel (None = no room).
    pub room: Option<String>,

    /// Resume cursor. `None` skips history entirely; `Some(ChangeId(0))`
    /// replays from the very first change.
    pub last_id: Option<ChangeId>,

    /// Maximum number of items delivered. Must be positive.
    pub limit: usize,

    /// Wall-clock point after which the feed closes.
    pub deadline: Instant,
}

impl SubscriptionRequest {
    /// Live-only request whose deadline is `timeout` from now.
    pub fn new(channel: Channel, limit: usize, timeout: Duration) -> Self {
        Self {
            channel,
            room: None,
            last_id: None,
            limit,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Request catch-up of everything after `last_id`.
    pub fn with_last_id(mut self, last_id: ChangeId) -> Self {
        self.last_id = Some(last_id);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Phase of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedState {
    /// Replaying durable changes newer than the resume cursor.
    CatchingUp,
    /// Forwarding live broadcasts.
    LiveTail,
    /// Output closed.
    Done,
}

/// Why a feed closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// Catch-up filled the limit, or the live tap could not be opened.
    CatchUpOnly,
    /// The limit was reached on the live tail.
    CapacityReached,
    /// The deadline elapsed.
    Deadline,
    /// The bus ended the live subscription.
    LiveClosed,
    /// Every consumer of the output went away.
    OutputClosed,
}

/// Outcome of a finished feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeSummary {
    /// Items placed on the output, catch-up included.
    pub delivered: usize,
    /// Live payloads dropped as overlap duplicates or unreadable.
    pub discarded: usize,
    pub end: EndReason,
}
