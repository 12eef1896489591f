//! Durable append-only change log.
//!
//! Every change is one frame:
//!
//! ```text
//! [magic "CHG\0"][version u8][body len u32][crc32 of body u32][msgpack body]
//! ```
//!
//! The per-partition offset index is not persisted; it is rebuilt by scanning
//! the log on open.

use super::{partition_key, window_since, ChangeReader, ChangeWriter, PartitionKey};
use crate::error::{FeedError, Result};
use crate::types::{Change, ChangeId, ChangeInput, Channel};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes for change frames.
const LOG_MAGIC: &[u8; 4] = b"CHG\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// magic + version + length + checksum
const FRAME_HEADER_SIZE: usize = 4 + 1 + 4 + 4;

const LOG_FILE: &str = "changes.log";
const LOCK_FILE: &str = "LOCK";

/// Configuration for a [`FileChangeLog`].
#[derive(Clone, Debug)]
pub struct FileChangeLogConfig {
    /// Directory holding the log and its lock file.
    pub path: PathBuf,

    /// Sync every N appends (0 and 1 both mean every append).
    pub sync_interval: u64,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for FileChangeLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./changes"),
            sync_interval: 100,
            create_if_missing: true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    id: ChangeId,
    offset: u64,
}

struct LogFile {
    file: File,
    size: u64,
    writes_since_sync: u64,
}

/// Change log persisted to a single append-only file.
pub struct FileChangeLog {
    path: PathBuf,

    /// Held for the lifetime of the log.
    _lock_file: File,

    file: Mutex<LogFile>,

    /// Partition -> frame offsets, ascending by id.
    index: RwLock<HashMap<PartitionKey, Vec<IndexEntry>>>,

    sync_interval: u64,
}

impl FileChangeLog {
    /// Open an existing log or create a new one.
    pub fn open(config: FileChangeLogConfig) -> Result<Self> {
        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(FeedError::Storage(format!(
                    "change log not found at {}",
                    config.path.display()
                )));
            }
            fs::create_dir_all(&config.path)?;
        }

        let lock_file = Self::acquire_lock(&config.path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(config.path.join(LOG_FILE))?;
        let size = file.metadata()?.len();

        let index = Self::scan(&mut file, size)?;
        debug!(
            path = %config.path.display(),
            partitions = index.len(),
            bytes = size,
            "opened change log"
        );

        Ok(Self {
            path: config.path,
            _lock_file: lock_file,
            file: Mutex::new(LogFile {
                file,
                size,
                writes_since_sync: 0,
            }),
            index: RwLock::new(index),
            sync_interval: config.sync_interval.max(1),
        })
    }

    /// Directory this log lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current log size in bytes.
    pub fn size(&self) -> u64 {
        self.file.lock().size
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut log = self.file.lock();
        log.file.sync_all()?;
        log.writes_since_sync = 0;
        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join(LOCK_FILE))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| FeedError::Locked)?;

        Ok(lock_file)
    }

    /// Rebuild the partition index from the frames on disk.
    fn scan(file: &mut File, size: u64) -> Result<HashMap<PartitionKey, Vec<IndexEntry>>> {
        let mut index: HashMap<PartitionKey, Vec<IndexEntry>> = HashMap::new();
        let mut offset = 0u64;

        file.seek(SeekFrom::Start(0))?;
        while offset < size {
            let (change, frame_len) = Self::read_frame(file, offset, size)?;
            index
                .entry((Channel::new(change.tenant, change.channel), change.room))
                .or_default()
                .push(IndexEntry {
                    id: change.id,
                    offset,
                });
            offset += frame_len;
        }

        Ok(index)
    }

    fn encode_frame(change: &Change) -> Result<Vec<u8>> {
        let body = rmp_serde::to_vec_named(change)?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());

        frame.extend_from_slice(LOG_MAGIC);
        frame.push(LOG_VERSION);
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        frame.extend_from_slice(&body);

        Ok(frame)
    }

    /// Read the frame at the current position. Returns the change and the
    /// total frame length. `end` is the size of the log; a frame claiming to
    /// run past it is corrupt.
    fn read_frame(file: &mut File, offset: u64, end: u64) -> Result<(Change, u64)> {
        let truncated = |e: std::io::Error| {
            if e.kind() == ErrorKind::UnexpectedEof {
                FeedError::Corruption(format!("truncated frame at offset {offset}"))
            } else {
                FeedError::Io(e)
            }
        };

        let mut header = [0u8; FRAME_HEADER_SIZE];
        file.read_exact(&mut header).map_err(truncated)?;

        if &header[0..4] != LOG_MAGIC {
            return Err(FeedError::Corruption(format!(
                "invalid frame magic at offset {offset}"
            )));
        }
        if header[4] != LOG_VERSION {
            return Err(FeedError::Corruption(format!(
                "unsupported log version {} at offset {offset}",
                header[4]
            )));
        }

        let body_len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;
        let stored = u32::from_le_bytes([header[9], header[10], header[11], header[12]]);

        let available = end.saturating_sub(offset + FRAME_HEADER_SIZE as u64);
        if body_len as u64 > available {
            return Err(FeedError::Corruption(format!(
                "frame at offset {offset} claims {body_len} bytes, {available} left in log"
            )));
        }

        let mut body = vec![0u8; body_len];
        file.read_exact(&mut body).map_err(truncated)?;

        let computed = crc32fast::hash(&body);
        if stored != computed {
            return Err(FeedError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        let change: Change = rmp_serde::from_slice(&body)?;
        Ok((change, (FRAME_HEADER_SIZE + body_len) as u64))
    }

    fn read_at(&self, offset: u64) -> Result<Change> {
        let mut log = self.file.lock();
        log.file.seek(SeekFrom::Start(offset))?;
        let end = log.size;
        let (change, _) = Self::read_frame(&mut log.file, offset, end)?;
        Ok(change)
    }
}

impl ChangeReader for FileChangeLog {
    fn fetch_since(
        &self,
        channel: Channel,
        room: Option<&str>,
        after: Option<ChangeId>,
        max_count: usize,
    ) -> Result<Vec<Change>> {
        let offsets: Vec<u64> = {
            let index = self.index.read();
            match index.get(&partition_key(channel, room)) {
                Some(entries) => {
                    let range = window_since(entries, |e| e.id, after, max_count);
                    entries[range].iter().map(|e| e.offset).collect()
                }
                None => return Ok(Vec::new()),
            }
        };

        offsets.into_iter().map(|offset| self.read_at(offset)).collect()
    }

    fn get(&self, channel: Channel, room: Option<&str>, id: ChangeId) -> Result<Option<Change>> {
        let offset = {
            let index = self.index.read();
            index.get(&partition_key(channel, room)).and_then(|entries| {
                entries
                    .binary_search_by_key(&id, |e| e.id)
                    .ok()
                    .map(|idx| entries[idx].offset)
            })
        };

        offset.map(|offset| self.read_at(offset)).transpose()
    }
}

impl ChangeWriter for FileChangeLog {
    fn append(&self, channel: Channel, room: Option<&str>, input: ChangeInput) -> Result<Change> {
        // File lock first, then index: appends are serialized and ids never race.
        let mut log = self.file.lock();
        let key = partition_key(channel, room);

        let id = self
            .index
            .read()
            .get(&key)
            .and_then(|entries| entries.last())
            .map_or(ChangeId(1), |e| e.id.next());

        let change = input.into_change(id, channel, room.map(str::to_owned));
        let frame = Self::encode_frame(&change)?;

        let offset = log.size;
        log.file.seek(SeekFrom::Start(offset))?;
        log.file.write_all(&frame)?;
        log.size += frame.len() as u64;

        log.writes_since_sync += 1;
        if log.writes_since_sync >= self.sync_interval {
            log.file.sync_all()?;
            log.writes_since_sync = 0;
        }

        self.index
            .write()
            .entry(key)
            .or_default()
            .push(IndexEntry { id, offset });

        Ok(change)
    }
}

impl Drop for FileChangeLog {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
