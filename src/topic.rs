//! Topic key derivation.
//!
//! Keys are `<prefix>:<tenant>:<channel>` with an optional `:<room hash>`
//! suffix. The same key filters the historical store and names the live
//! broadcast topic, so both sides of a subscription always agree.

use crate::types::{ChannelId, TenantId};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix for change streams.
const STREAM_PREFIX: &str = "stream:channel";

/// Prefix for the publisher lock held by the write path.
const PUBLISH_LOCK_PREFIX: &str = "lock:channel:publish";

/// Bytes of the room digest kept in the key (hex doubles the width).
const ROOM_HASH_BYTES: usize = 16;

/// Derived name of a broadcast topic / historical partition.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicKey(String);

impl TopicKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicKey({})", self.0)
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-width hex digest of a room name.
pub fn room_hash(room: &str) -> String {
    let digest = Sha256::digest(room.as_bytes());
    hex::encode(&digest[..ROOM_HASH_BYTES])
}

fn with_room(mut base: String, room: Option<&str>) -> TopicKey {
    if let Some(room) = room {
        base.push(':');
        base.push_str(&room_hash(room));
    }
    TopicKey(base)
}

/// Key of the change stream for a channel and optional room.
///
/// An empty room is still a room: `Some("")` and `None` derive different keys.
pub fn stream_key(tenant: TenantId, channel: ChannelId, room: Option<&str>) -> TopicKey {
    with_room(format!("{STREAM_PREFIX}:{tenant}:{channel}"), room)
}

/// Key of the lock publishers take before appending to a stream.
pub fn publish_lock_key(tenant: TenantId, channel: ChannelId, room: Option<&str>) -> TopicKey {
    with_room(format!("{PUBLISH_LOCK_PREFIX}:{tenant}:{channel}"), room)
}
