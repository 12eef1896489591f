//! In-process change log.

use super::{partition_key, window_since, ChangeReader, ChangeWriter, PartitionKey};
use crate::error::Result;
use crate::types::{Change, ChangeId, ChangeInput, Channel};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Change log held entirely in memory.
#[derive(Default)]
pub struct MemoryChangeLog {
    /// Partition -> changes, ascending by id.
    partitions: RwLock<HashMap<PartitionKey, Vec<Change>>>,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of changes stored for a partition.
    pub fn len(&self, channel: Channel, room: Option<&str>) -> usize {
        self.partitions
            .read()
            .get(&partition_key(channel, room))
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, channel: Channel, room: Option<&str>) -> bool {
        self.len(channel, room) == 0
    }
}

impl ChangeReader for MemoryChangeLog {
    fn fetch_since(
        &self,
        channel: Channel,
        room: Option<&str>,
        after: Option<ChangeId>,
        max_count: usize,
    ) -> Result<Vec<Change>> {
        let partitions = self.partitions.read();
        let Some(changes) = partitions.get(&partition_key(channel, room)) else {
            return Ok(Vec::new());
        };

        let range = window_since(changes, |c| c.id, after, max_count);
        Ok(changes[range].to_vec())
    }

    fn get(&self, channel: Channel, room: Option<&str>, id: ChangeId) -> Result<Option<Change>> {
        let partitions = self.partitions.read();
        Ok(partitions
            .get(&partition_key(channel, room))
            .and_then(|changes| {
                changes
                    .binary_search_by_key(&id, |c| c.id)
                    .ok()
                    .map(|idx| changes[idx].clone())
            }))
    }
}

impl ChangeWriter for MemoryChangeLog {
    fn append(&self, channel: Channel, room: Option<&str>, input: ChangeInput) -> Result<Change> {
        let mut partitions = self.partitions.write();
        let changes = partitions.entry(partition_key(channel, room)).or_default();

        let id = changes.last().map_or(ChangeId(1), |c| c.id.next());
        let change = input.into_change(id, channel, room.map(str::to_owned));
        changes.push(change.clone());

        Ok(change)
    }
}
