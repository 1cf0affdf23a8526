//! # flowstead-wal
//!
//! Write-ahead log for workflow records.
//!
//! Every mutation a tenant store performs is framed into a checksummed
//! record and appended to a segmented log. Stores rebuild their in-memory
//! indexes by replaying the log on open, and drop old segments once a
//! snapshot covers them.

pub mod entry;
pub mod error;
pub mod recovery;
pub mod segment;
pub mod wal;

pub use entry::{WalEntry, WalEntryType, WalRecord};
pub use error::WalError;
pub use recovery::{repair_wal, verify_wal, RecoveryReport, SegmentDamage};
pub use segment::{Segment, SegmentId};
pub use wal::{FsyncPolicy, Wal, WalConfig, WalOffset};

/// Default segment size (16 MiB).
pub const DEFAULT_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Record header size in bytes.
pub const RECORD_HEADER_SIZE: usize = 24;
