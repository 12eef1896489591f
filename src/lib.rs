//! # Change Feed
//!
//! Ordered, gap-free, duplicate-free change subscriptions for tenant-scoped
//! channels.
//!
//! ## Core Concepts
//!
//! - **Changes**: Immutable events with per channel+room increasing ids
//! - **Topic keys**: Deterministic names for a channel and optional room
//! - **Catch-up**: Replay of durable changes newer than a resume cursor
//! - **Live tail**: Broadcasts received after the subscription opened
//! - **Transports**: Streaming push or single take-first response
//!
//! ## Example
//!
//! ```ignore
//! use changefeed::{ChangeFeedService, FeedConfig, MemoryBroker, MemoryChangeLog};
//!
//! let log = Arc::new(MemoryChangeLog::new());
//! let broker = Arc::new(MemoryBroker::new());
//! let service = ChangeFeedService::new(FeedConfig::from_env()?, log, broker);
//!
//! let params = SubscribeParams::default()
//!     .with_room("lobby")
//!     .with_last_id("41")
//!     .with_transport("websocket");
//! service.handle(channel, &params, LineSink::new(socket))?;
//! ```

pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod feed;
pub mod records;
pub mod service;
pub mod topic;
pub mod transport;
pub mod types;

// Re-exports
pub use broker::{Broker, LiveSubscription, MemoryBroker, SubscriptionId};
pub use codec::{encode_change, extract_id, ChangeResponse};
pub use config::FeedConfig;
pub use error::{FeedError, Result};
pub use feed::{EndReason, FeedMerger, FeedOutput, FeedState, MergeSummary, SubscriptionRequest};
pub use records::{ChangeReader, ChangeWriter, FileChangeLog, FileChangeLogConfig, MemoryChangeLog};
pub use service::{ChangeFeedService, SubscribeParams};
pub use topic::{publish_lock_key, room_hash, stream_key, TopicKey};
pub use transport::{
    is_peer_closed, Delivery, FeedConsumer, FrameSink, LineSink, SingleResponse, Streaming,
    TransportKind,
};
pub use types::*;
