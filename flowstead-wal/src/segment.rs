//! Segment files.
//!
//! The log is a sequence of numbered files named `<16 hex digits>.wal`. Only
//! the highest-numbered segment is ever appended to; a record that would
//! overflow it triggers rotation to a fresh file.

use crate::entry::WalRecord;
use crate::error::WalError;
use crate::RECORD_HEADER_SIZE;
use bytes::BytesMut;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Segment identifier (monotonically increasing, starting at 1).
pub type SegmentId = u64;

const SEGMENT_EXT: &str = ".wal";
const READ_CHUNK: usize = 16 * 1024;

pub fn segment_filename(id: SegmentId) -> String {
    format!("{:016x}{}", id, SEGMENT_EXT)
}

pub fn parse_segment_filename(name: &str) -> Option<SegmentId> {
    let stem = name.strip_suffix(SEGMENT_EXT)?;
    if stem.len() != 16 {
        return None;
    }
    u64::from_str_radix(stem, 16).ok()
}

/// Lists the segment ids present in `dir`, ascending.
pub fn list_segments(dir: &Path) -> Result<Vec<SegmentId>, WalError> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(id) = parse_segment_filename(&entry.file_name().to_string_lossy()) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// One segment file.
pub struct Segment {
    id: SegmentId,
    path: PathBuf,
    file: File,
    size: u64,
    max_size: u64,
    dirty: bool,
}

impl Segment {
    /// Creates a new, empty segment. Fails if the file already exists.
    pub fn create(dir: &Path, id: SegmentId, max_size: u64) -> Result<Self, WalError> {
        let path = dir.join(segment_filename(id));
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;

        Ok(Self {
            id,
            path,
            file,
            size: 0,
            max_size,
            dirty: false,
        })
    }

    pub fn open(dir: &Path, id: SegmentId, max_size: u64) -> Result<Self, WalError> {
        let path = dir.join(segment_filename(id));
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            id,
            path,
            file,
            size,
            max_size,
            dirty: false,
        })
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn can_fit(&self, record_size: usize) -> bool {
        self.size + record_size as u64 <= self.max_size
    }

    /// Appends a record and returns the byte offset it was written at.
    pub fn append(&mut self, record: &WalRecord) -> Result<u64, WalError> {
        let encoded = record.encode()?;
        let offset = self.size;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&encoded)?;
        self.size += encoded.len() as u64;
        self.dirty = true;

        Ok(offset)
    }

    pub fn sync(&mut self) -> Result<(), WalError> {
        if self.dirty {
            self.file.sync_data()?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Reads every complete record in the segment, in file order.
    ///
    /// A trailing partial record is ignored; a corrupted record is an error.
    pub fn read_all(&mut self) -> Result<Vec<(u64, WalRecord)>, WalError> {
        self.file.seek(SeekFrom::Start(0))?;

        let mut records = Vec::new();
        let mut buf = BytesMut::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut offset = 0u64;

        loop {
            let n = self.file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            while buf.len() >= RECORD_HEADER_SIZE {
                match WalRecord::decode(&mut buf, offset)? {
                    Some(record) => {
                        let size = record.disk_size() as u64;
                        records.push((offset, record));
                        offset += size;
                    }
                    None => break,
                }
            }
        }

        Ok(records)
    }

    /// Cuts the file back to `offset`, discarding anything after it.
    pub fn truncate_at(&mut self, offset: u64) -> Result<(), WalError> {
        self.file.set_len(offset)?;
        self.size = offset;
        self.dirty = true;
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::WalEntry;
    use tempfile::TempDir;

    fn checkpoint(ts: i64, seq: u64) -> WalRecord {
        WalRecord::from_entry(&WalEntry::Checkpoint { timestamp: ts }, seq).unwrap()
    }

    #[test]
    fn test_segment_filename_parsing() {
        assert_eq!(segment_filename(1), "0000000000000001.wal");
        assert_eq!(parse_segment_filename("00000000000000ff.wal"), Some(255));
        assert_eq!(parse_segment_filename("ff.wal"), None);
        assert_eq!(parse_segment_filename("0000000000000001.log"), None);
        assert_eq!(parse_segment_filename("zzzzzzzzzzzzzzzz.wal"), None);
    }

    #[test]
    fn test_append_then_read_back_in_order() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 1, 1 << 20).unwrap();

        let mut offsets = Vec::new();
        for i in 0..4 {
            offsets.push(segment.append(&checkpoint(i, i as u64 + 1)).unwrap());
        }
        segment.sync().unwrap();

        let records = segment.read_all().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].0, 0);
        for ((offset, record), expected) in records.iter().zip(&offsets) {
            assert_eq!(offset, expected);
            assert!(record.header.sequence >= 1);
        }
    }

    #[test]
    fn test_reopen_keeps_size() {
        let dir = TempDir::new().unwrap();
        let size = {
            let mut segment = Segment::create(dir.path(), 3, 1 << 20).unwrap();
            segment.append(&checkpoint(1, 1)).unwrap();
            segment.sync().unwrap();
            segment.size()
        };

        let segment = Segment::open(dir.path(), 3, 1 << 20).unwrap();
        assert_eq!(segment.size(), size);
        assert_eq!(list_segments(dir.path()).unwrap(), vec![3]);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        Segment::create(dir.path(), 1, 1024).unwrap();
        assert!(matches!(
            Segment::create(dir.path(), 1, 1024),
            Err(WalError::Io(_))
        ));
    }

    #[test]
    fn test_truncate_discards_tail() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 1, 1 << 20).unwrap();
        segment.append(&checkpoint(1, 1)).unwrap();
        let second = segment.append(&checkpoint(2, 2)).unwrap();

        segment.truncate_at(second).unwrap();
        assert_eq!(segment.read_all().unwrap().len(), 1);
        assert_eq!(segment.size(), second);
    }
}
