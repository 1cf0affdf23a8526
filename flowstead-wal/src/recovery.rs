//! Crash recovery.
//!
//! A crash mid-append leaves a torn record at the tail of the active segment.
//! `verify_wal` reports such damage along with anything worse (checksum or
//! header failures); `repair_wal` truncates each damaged segment back to its
//! last intact record so the log can be reopened.

use crate::entry::WalRecord;
use crate::error::WalError;
use crate::segment::{list_segments, Segment, SegmentId};
use bytes::BytesMut;
use std::io::Read;
use std::path::Path;

/// The first problem found in one segment.
#[derive(Debug, Clone)]
pub struct SegmentDamage {
    pub segment: SegmentId,
    /// End of the last intact record.
    pub valid_end: u64,
    pub reason: String,
    /// The segment merely ends in an incomplete record.
    pub torn: bool,
}

/// Outcome of a recovery scan.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub valid_records: u64,
    /// Bytes past the last intact record, summed over all segments.
    pub trailing_bytes: u64,
    pub damaged_segments: Vec<SegmentDamage>,
    pub max_sequence: u64,
    /// Newest segment scanned.
    pub last_segment: Option<SegmentId>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.damaged_segments.is_empty()
    }

    /// Whether the only damage is an incomplete record at the end of the
    /// newest segment, which is what an interrupted append leaves behind.
    pub fn is_torn_tail_only(&self) -> bool {
        match self.damaged_segments.as_slice() {
            [damage] => damage.torn && Some(damage.segment) == self.last_segment,
            _ => false,
        }
    }
}

/// Scans all segments without modifying them.
pub fn verify_wal(dir: impl AsRef<Path>, segment_size: u64) -> Result<RecoveryReport, WalError> {
    scan(dir.as_ref(), segment_size, false)
}

/// Scans all segments and truncates damaged tails.
pub fn repair_wal(dir: impl AsRef<Path>, segment_size: u64) -> Result<RecoveryReport, WalError> {
    scan(dir.as_ref(), segment_size, true)
}

fn scan(dir: &Path, segment_size: u64, repair: bool) -> Result<RecoveryReport, WalError> {
    let mut report = RecoveryReport::default();
    if !dir.exists() {
        return Ok(report);
    }

    for id in list_segments(dir)? {
        report.last_segment = Some(id);
        let mut segment = Segment::open(dir, id, segment_size)?;

        let mut raw = Vec::with_capacity(segment.size() as usize);
        std::fs::File::open(segment.path())?.read_to_end(&mut raw)?;
        let file_size = raw.len() as u64;
        let mut buf = BytesMut::from(&raw[..]);

        let mut valid_end = 0u64;
        let mut problem: Option<(String, bool)> = None;
        loop {
            match WalRecord::decode(&mut buf, valid_end) {
                Ok(Some(record)) => {
                    report.valid_records += 1;
                    report.max_sequence = report.max_sequence.max(record.header.sequence);
                    valid_end += record.disk_size() as u64;
                }
                Ok(None) => {
                    if !buf.is_empty() && buf.iter().any(|&b| b != 0) {
                        problem = Some(("incomplete record at end of segment".to_string(), true));
                    }
                    break;
                }
                Err(e) => {
                    problem = Some((e.to_string(), false));
                    break;
                }
            }
        }

        let trailing = file_size - valid_end;
        report.trailing_bytes += trailing;

        if let Some((reason, torn)) = problem {
            if repair {
                segment.truncate_at(valid_end)?;
                tracing::warn!(
                    segment = id,
                    offset = valid_end,
                    removed = trailing,
                    "truncated damaged WAL segment"
                );
            }
            report.damaged_segments.push(SegmentDamage {
                segment: id,
                valid_end,
                reason,
                torn,
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::WalEntry;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_segment(dir: &Path, records: u64) -> Segment {
        let mut segment = Segment::create(dir, 1, 1 << 20).unwrap();
        for i in 1..=records {
            let record =
                WalRecord::from_entry(&WalEntry::Checkpoint { timestamp: i as i64 }, i).unwrap();
            segment.append(&record).unwrap();
        }
        segment.sync().unwrap();
        segment
    }

    #[test]
    fn test_clean_log_verifies() {
        let dir = TempDir::new().unwrap();
        write_segment(dir.path(), 4);

        let report = verify_wal(dir.path(), 1 << 20).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.valid_records, 4);
        assert_eq!(report.max_sequence, 4);
        assert_eq!(report.trailing_bytes, 0);
    }

    #[test]
    fn test_torn_tail_is_repaired() {
        let dir = TempDir::new().unwrap();
        let segment = write_segment(dir.path(), 3);
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(segment.path())
            .unwrap();
        file.write_all(b"FSWL\x01\x01\x00\x00\x00\x00").unwrap();
        drop(file);

        let report = verify_wal(dir.path(), 1 << 20).unwrap();
        assert!(!report.is_clean());
        assert!(report.is_torn_tail_only());
        assert_eq!(report.valid_records, 3);
        assert_eq!(report.trailing_bytes, 10);

        repair_wal(dir.path(), 1 << 20).unwrap();
        let report = verify_wal(dir.path(), 1 << 20).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.valid_records, 3);
    }

    #[test]
    fn test_corrupted_record_truncates_from_there() {
        let dir = TempDir::new().unwrap();
        let segment = write_segment(dir.path(), 3);
        let mut raw = std::fs::read(segment.path()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        std::fs::write(segment.path(), &raw).unwrap();

        let verified = verify_wal(dir.path(), 1 << 20).unwrap();
        assert!(!verified.is_torn_tail_only());
        assert!(!verified.damaged_segments[0].torn);
        assert_eq!(std::fs::read(segment.path()).unwrap(), raw);

        let report = repair_wal(dir.path(), 1 << 20).unwrap();
        assert_eq!(report.valid_records, 2);
        assert_eq!(report.damaged_segments.len(), 1);
        assert!(verify_wal(dir.path(), 1 << 20).unwrap().is_clean());
    }

    #[test]
    fn test_torn_record_in_older_segment_is_not_a_tail() {
        let dir = TempDir::new().unwrap();
        let first = write_segment(dir.path(), 2);
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(first.path())
            .unwrap();
        file.write_all(b"FSWL\x01\x01").unwrap();
        drop(file);
        Segment::create(dir.path(), 2, 1 << 20).unwrap();

        let report = verify_wal(dir.path(), 1 << 20).unwrap();
        assert_eq!(report.last_segment, Some(2));
        assert!(report.damaged_segments[0].torn);
        assert!(!report.is_torn_tail_only());
    }

    #[test]
    fn test_missing_dir_is_clean() {
        let dir = TempDir::new().unwrap();
        let report = verify_wal(dir.path().join("absent"), 1024).unwrap();
        assert!(report.is_clean());
    }
}
