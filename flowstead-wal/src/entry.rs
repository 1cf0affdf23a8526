//! Record framing and typed entries.
//!
//! On-disk layout of one record (big-endian):
//!
//! ```text
//! +--------+------+---------+----------+---------+---------+----------+---------+
//! | magic  | type | version | reserved | length  | crc32c  | sequence | payload |
//! | 4      | 1    | 1       | 2        | 4       | 4       | 8        | length  |
//! +--------+------+---------+----------+---------+---------+----------+---------+
//! ```
//!
//! The checksum covers the type byte, the sequence number and the payload, so
//! a record whose header was torn mid-write cannot masquerade as another
//! entry kind.

use crate::error::WalError;
use crate::RECORD_HEADER_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Magic bytes opening every record.
pub const WAL_MAGIC: [u8; 4] = *b"FSWL";

/// Current record format version.
pub const WAL_VERSION: u8 = 1;

/// Maximum record payload size (8 MiB).
pub const MAX_RECORD_SIZE: usize = 8 * 1024 * 1024;

/// Kind of record, stored in the header so scans can skip payload parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WalEntryType {
    CommitStep = 1,
    DeleteInstance = 2,
    Checkpoint = 3,
}

impl TryFrom<u8> for WalEntryType {
    type Error = WalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WalEntryType::CommitStep),
            2 => Ok(WalEntryType::DeleteInstance),
            3 => Ok(WalEntryType::Checkpoint),
            other => Err(WalError::InvalidHeader {
                offset: 0,
                reason: format!("unknown entry type {}", other),
            }),
        }
    }
}

/// Decoded record header.
#[derive(Debug, Clone)]
pub struct WalRecordHeader {
    pub entry_type: WalEntryType,
    pub version: u8,
    pub payload_len: u32,
    pub crc32c: u32,
    pub sequence: u64,
}

/// A framed record: header plus raw payload bytes.
#[derive(Debug, Clone)]
pub struct WalRecord {
    pub header: WalRecordHeader,
    pub payload: Bytes,
}

fn record_checksum(entry_type: WalEntryType, sequence: u64, payload: &[u8]) -> u32 {
    let crc = crc32c::crc32c(&[entry_type as u8]);
    let crc = crc32c::crc32c_append(crc, &sequence.to_be_bytes());
    crc32c::crc32c_append(crc, payload)
}

impl WalRecord {
    pub fn new(entry_type: WalEntryType, sequence: u64, payload: Bytes) -> Self {
        Self {
            header: WalRecordHeader {
                entry_type,
                version: WAL_VERSION,
                payload_len: payload.len() as u32,
                crc32c: record_checksum(entry_type, sequence, &payload),
                sequence,
            },
            payload,
        }
    }

    /// Serializes a typed entry into a record.
    pub fn from_entry(entry: &WalEntry, sequence: u64) -> Result<Self, WalError> {
        let payload = serde_json::to_vec(entry)?;
        Ok(Self::new(entry.entry_type(), sequence, Bytes::from(payload)))
    }

    /// Parses the payload back into a typed entry.
    pub fn entry(&self) -> Result<WalEntry, WalError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn encode(&self) -> Result<BytesMut, WalError> {
        if self.payload.len() > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                size: self.payload.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(self.disk_size());
        buf.put_slice(&WAL_MAGIC);
        buf.put_u8(self.header.entry_type as u8);
        buf.put_u8(self.header.version);
        buf.put_u16(0);
        buf.put_u32(self.header.payload_len);
        buf.put_u32(self.header.crc32c);
        buf.put_u64(self.header.sequence);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes one record from the front of `buf`.
    ///
    /// Returns `Ok(None)` when the buffer holds an incomplete record or
    /// zero padding; the buffer is left untouched in that case.
    pub fn decode(buf: &mut BytesMut, offset: u64) -> Result<Option<Self>, WalError> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Ok(None);
        }

        let magic = &buf[0..4];
        if magic != WAL_MAGIC {
            if magic == [0u8; 4] {
                return Ok(None);
            }
            return Err(WalError::InvalidHeader {
                offset,
                reason: format!("bad magic {:02x?}", magic),
            });
        }

        let entry_type = WalEntryType::try_from(buf[4]).map_err(|_| WalError::InvalidHeader {
            offset,
            reason: format!("unknown entry type {}", buf[4]),
        })?;
        let version = buf[5];
        if version != WAL_VERSION {
            return Err(WalError::InvalidHeader {
                offset,
                reason: format!("unsupported record version {}", version),
            });
        }

        let mut header = &buf[8..RECORD_HEADER_SIZE];
        let payload_len = header.get_u32() as usize;
        let crc_expected = header.get_u32();
        let sequence = header.get_u64();

        if payload_len > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                size: payload_len,
                max: MAX_RECORD_SIZE,
            });
        }
        if buf.len() < RECORD_HEADER_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(RECORD_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        let crc_actual = record_checksum(entry_type, sequence, &payload);
        if crc_actual != crc_expected {
            return Err(WalError::CorruptedRecord {
                offset,
                expected: crc_expected,
                actual: crc_actual,
            });
        }

        Ok(Some(Self {
            header: WalRecordHeader {
                entry_type,
                version,
                payload_len: payload_len as u32,
                crc32c: crc_expected,
                sequence,
            },
            payload,
        }))
    }

    pub fn disk_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.payload.len()
    }
}

/// Typed log entry. Domain objects travel as JSON values so the log stays
/// independent of the engine's types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalEntry {
    /// One engine step: the instance image after it and the audit records
    /// it produced. Replay applies the whole step or none of it.
    CommitStep {
        instance_id: String,
        tenant_id: String,
        /// The step created the instance.
        #[serde(default)]
        creates: bool,
        instance: Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        transitions: Vec<Value>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        action_logs: Vec<Value>,
    },
    /// Removes an instance together with its history.
    DeleteInstance { instance_id: String },
    /// Marks the point a compacted snapshot was taken at. Everything before
    /// it is folded into the snapshot.
    Checkpoint { timestamp: i64 },
}

impl WalEntry {
    pub fn entry_type(&self) -> WalEntryType {
        match self {
            WalEntry::CommitStep { .. } => WalEntryType::CommitStep,
            WalEntry::DeleteInstance { .. } => WalEntryType::DeleteInstance,
            WalEntry::Checkpoint { .. } => WalEntryType::Checkpoint,
        }
    }
}
