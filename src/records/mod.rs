//! Historical change storage.
//!
//! Changes are kept per partition (tenant, channel and optional room) in ascending id
//! order. Readers only ever ask for "everything newer than X, at most N".

mod log;
mod memory;

pub use log::{FileChangeLog, FileChangeLogConfig};
pub use memory::MemoryChangeLog;

use crate::error::Result;
use crate::types::{Change, ChangeId, ChangeInput, Channel};

/// Partition key of the historical store.
pub(crate) type PartitionKey = (Channel, Option<String>);

pub(crate) fn partition_key(channel: Channel, room: Option<&str>) -> PartitionKey {
    (channel, room.map(str::to_owned))
}

/// Read side of the historical store.
pub trait ChangeReader: Send + Sync {
    /// Changes strictly newer than `after` (all when `None`), ascending by
    /// id, at most `max_count` of them. An empty result is not an error.
    fn fetch_since(
        &self,
        channel: Channel,
        room: Option<&str>,
        after: Option<ChangeId>,
        max_count: usize,
    ) -> Result<Vec<Change>>;

    /// A single change by id.
    fn get(&self, channel: Channel, room: Option<&str>, id: ChangeId) -> Result<Option<Change>>;
}

/// Append side of the historical store.
pub trait ChangeWriter: Send + Sync {
    /// Append a change, assigning the next id of its partition.
    fn append(&self, channel: Channel, room: Option<&str>, input: ChangeInput) -> Result<Change>;
}

/// Index range of `ids` (ascending) holding entries newer than `after`,
/// capped at `max_count`.
pub(crate) fn window_since<T>(
    entries: &[T],
    id_of: impl Fn(&T) -> ChangeId,
    after: Option<ChangeId>,
    max_count: usize,
) -> std::ops::Range<usize> {
    let start = match after {
        Some(after) => entries.partition_point(|e| id_of(e) <= after),
        None => 0,
    };
    let end = start.saturating_add(max_count).min(entries.len());
    start..end
}
