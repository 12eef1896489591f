//! Change-feed subscriptions.
//!
//! A feed replays durable changes newer than a resume cursor, then keeps
//! forwarding live broadcasts until it has delivered `limit` items or its
//! deadline passes:
//!
//! ```text
//!  CatchingUp ──(limit filled)──────────────────────────────► Done
//!      │                                                        ▲
//!      └──(capacity left)──► LiveTail ──(capacity/deadline/bus end)┘
//! ```
//!
//! Live payloads whose id is at or below the last id delivered by catch-up
//! are overlap duplicates and are discarded. The first live id past that mark
//! turns the check off for the rest of the feed.
//!
//! # Example
//!
//! ```ignore
//! let merger = FeedMerger::new(log, broker);
//! let request = SubscriptionRequest::new(channel, 100, Duration::from_secs(60))
//!     .with_room("lobby")
//!     .with_last_id(ChangeId(41));
//!
//! for item in merger.open(request)? {
//!     socket.send(&item)?;
//! }
//! ```

mod merger;
mod output;
mod types;

pub use merger::FeedMerger;
pub use output::FeedOutput;
pub use types::{EndReason, FeedState, MergeSummary, SubscriptionRequest};
