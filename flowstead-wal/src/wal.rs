//! The write-ahead log.

use crate::entry::{WalEntry, WalRecord};
use crate::error::WalError;
use crate::segment::{list_segments, segment_filename, Segment, SegmentId};
use crate::DEFAULT_SEGMENT_SIZE;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// When appended records are flushed to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsyncPolicy {
    /// Fsync after every append.
    #[default]
    EveryWrite,
    /// Fsync after every N appends.
    EveryN(u32),
    /// Leave flushing to the OS and explicit `sync()` calls.
    Never,
}

/// WAL configuration.
#[derive(Debug, Clone)]
pub struct WalConfig {
    pub dir: PathBuf,
    pub segment_size: u64,
    pub fsync_policy: FsyncPolicy,
}

impl WalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            fsync_policy: FsyncPolicy::default(),
        }
    }

    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    pub fn with_fsync_policy(mut self, policy: FsyncPolicy) -> Self {
        self.fsync_policy = policy;
        self
    }
}

/// Position of a record: segment id in the high 24 bits, byte offset within
/// the segment in the low 40.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WalOffset(u64);

impl WalOffset {
    const OFFSET_BITS: u64 = 40;
    const OFFSET_MASK: u64 = (1 << Self::OFFSET_BITS) - 1;

    pub fn new(segment_id: SegmentId, offset: u64) -> Self {
        debug_assert!(offset <= Self::OFFSET_MASK);
        Self((segment_id << Self::OFFSET_BITS) | (offset & Self::OFFSET_MASK))
    }

    pub fn segment_id(&self) -> SegmentId {
        self.0 >> Self::OFFSET_BITS
    }

    pub fn offset(&self) -> u64 {
        self.0 & Self::OFFSET_MASK
    }
}

/// A replayed entry: (sequence, position, entry).
pub type ReplayedEntry = (u64, WalOffset, WalEntry);

/// Append-only, segmented log.
pub struct Wal {
    config: WalConfig,
    /// Segment currently accepting appends.
    active: Mutex<Segment>,
    next_sequence: AtomicU64,
    writes_since_sync: AtomicU64,
}

impl Wal {
    /// Opens the log in `config.dir`, creating the directory and a first
    /// segment when needed.
    pub fn open(config: WalConfig) -> Result<Self, WalError> {
        std::fs::create_dir_all(&config.dir)?;

        let ids = list_segments(&config.dir)?;
        let mut max_sequence = 0u64;
        for &id in &ids {
            let mut segment = Segment::open(&config.dir, id, config.segment_size)?;
            if let Some((_, last)) = segment.read_all()?.last() {
                max_sequence = max_sequence.max(last.header.sequence);
            }
        }

        let active = match ids.last() {
            Some(&id) => Segment::open(&config.dir, id, config.segment_size)?,
            None => Segment::create(&config.dir, 1, config.segment_size)?,
        };

        tracing::debug!(
            dir = %config.dir.display(),
            segments = ids.len().max(1),
            next_sequence = max_sequence + 1,
            "WAL opened"
        );

        Ok(Self {
            config,
            active: Mutex::new(active),
            next_sequence: AtomicU64::new(max_sequence + 1),
            writes_since_sync: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Appends an entry and returns its sequence number and position.
    pub fn append(&self, entry: &WalEntry) -> Result<(u64, WalOffset), WalError> {
        let mut active = self.active.lock();

        // Sequences are only handed out under the append lock, so a rejected
        // record leaves no gap.
        let sequence = self.next_sequence.load(Ordering::SeqCst);
        let record = WalRecord::from_entry(entry, sequence)?;
        let size = record.disk_size();

        if size as u64 > self.config.segment_size {
            return Err(WalError::SegmentTooSmall {
                size,
                segment_size: self.config.segment_size,
            });
        }

        if !active.can_fit(size) {
            self.roll(&mut active)?;
        }

        let offset = active.append(&record)?;
        self.next_sequence.store(sequence + 1, Ordering::SeqCst);
        let position = WalOffset::new(active.id(), offset);

        let writes = self.writes_since_sync.fetch_add(1, Ordering::Relaxed) + 1;
        let should_sync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => writes >= u64::from(n.max(1)),
            FsyncPolicy::Never => false,
        };
        if should_sync {
            active.sync()?;
            self.writes_since_sync.store(0, Ordering::Relaxed);
        }

        Ok((sequence, position))
    }

    /// Flushes the active segment to disk.
    pub fn sync(&self) -> Result<(), WalError> {
        self.active.lock().sync()?;
        self.writes_since_sync.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Reads every entry in the log, oldest first.
    pub fn read_all(&self) -> Result<Vec<ReplayedEntry>, WalError> {
        // Hold the append lock so a concurrent rotation cannot slip a segment
        // past the directory listing.
        let active = self.active.lock();
        let mut entries = Vec::new();

        for id in list_segments(&self.config.dir)? {
            if id > active.id() {
                break;
            }
            let records =
                Segment::open(&self.config.dir, id, self.config.segment_size)?.read_all()?;
            for (offset, record) in records {
                entries.push((
                    record.header.sequence,
                    WalOffset::new(id, offset),
                    record.entry()?,
                ));
            }
        }

        Ok(entries)
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    pub fn segment_ids(&self) -> Result<Vec<SegmentId>, WalError> {
        list_segments(&self.config.dir)
    }

    /// Total bytes across all segment files.
    pub fn total_size(&self) -> Result<u64, WalError> {
        let mut total = 0;
        for id in self.segment_ids()? {
            total += Segment::open(&self.config.dir, id, self.config.segment_size)?.size();
        }
        Ok(total)
    }

    /// Starts a fresh segment unless the active one is still empty, and
    /// returns the id of the segment now accepting appends.
    pub fn rotate(&self) -> Result<SegmentId, WalError> {
        let mut active = self.active.lock();
        if active.size() > 0 {
            self.roll(&mut active)?;
        }
        Ok(active.id())
    }

    /// Deletes every segment older than the one holding `before`. The active
    /// segment is never removed. Returns the number of segments deleted.
    pub fn compact_before(&self, before: WalOffset) -> Result<usize, WalError> {
        let active = self.active.lock();
        let target = before.segment_id().min(active.id());

        let mut deleted = 0;
        for id in list_segments(&self.config.dir)? {
            if id >= target {
                break;
            }
            std::fs::remove_file(self.config.dir.join(segment_filename(id)))?;
            tracing::info!(segment = id, "compacted WAL segment");
            deleted += 1;
        }
        Ok(deleted)
    }

    fn roll(&self, active: &mut Segment) -> Result<(), WalError> {
        active.sync()?;
        let next_id = active.id() + 1;
        *active = Segment::create(&self.config.dir, next_id, self.config.segment_size)?;
        tracing::debug!(segment = next_id, "rotated WAL segment");
        Ok(())
    }
}
