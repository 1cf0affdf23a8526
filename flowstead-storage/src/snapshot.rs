//! Compacted store images.
//!
//! A snapshot holds every live instance with its full audit trail, plus the
//! WAL sequence of the checkpoint it was taken at. On open the store loads
//! the snapshot and replays only the log entries after that checkpoint.
//!
//! File layout: the crc32c of the JSON body as 8 hex digits, a newline, then
//! the body.

use crate::error::StorageError;
use flowstead_core::{ActionLog, TransitionRecord, WorkflowInstance};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// One instance and everything recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceImage {
    pub instance: WorkflowInstance,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
    #[serde(default)]
    pub action_logs: Vec<ActionLog>,
}

/// Image of a whole tenant store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// WAL sequence of the checkpoint; entries up to it are folded in.
    pub wal_sequence: u64,
    /// Next audit sequence number at snapshot time.
    pub next_sequence: u64,
    pub created_at: i64,
    pub instances: Vec<InstanceImage>,
}

impl StoreSnapshot {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(SNAPSHOT_FILE)
    }

    /// Loads the snapshot in `dir`, if one was written.
    pub fn load(dir: &Path) -> Result<Option<Self>, StorageError> {
        let path = Self::path(dir);
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(&path)?;
        let (header, body) = match data.iter().position(|&b| b == b'\n') {
            Some(pos) => (&data[..pos], &data[pos + 1..]),
            None => {
                return Err(StorageError::Corruption(format!(
                    "snapshot {} has no checksum header",
                    path.display()
                )))
            }
        };

        let expected = std::str::from_utf8(header)
            .ok()
            .and_then(|h| u32::from_str_radix(h.trim(), 16).ok());
        let actual = crc32c::crc32c(body);
        if expected != Some(actual) {
            return Err(StorageError::Corruption(format!(
                "snapshot {} checksum mismatch",
                path.display()
            )));
        }

        Ok(Some(serde_json::from_slice(body)?))
    }

    /// Writes the snapshot next to the log, replacing any previous one.
    /// Returns the file size.
    pub fn write(&self, dir: &Path) -> Result<u64, StorageError> {
        let body = serde_json::to_vec(self)?;
        let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE));

        let mut file = File::create(&tmp)?;
        file.write_all(format!("{:08x}\n", crc32c::crc32c(&body)).as_bytes())?;
        file.write_all(&body)?;
        file.sync_all()?;
        let size = file.metadata()?.len();
        drop(file);

        fs::rename(&tmp, Self::path(dir))?;
        tracing::info!(
            dir = %dir.display(),
            instances = self.instances.len(),
            wal_sequence = self.wal_sequence,
            "wrote store snapshot"
        );
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstead_core::{Node, NodeKind, WorkflowGraph};
    use tempfile::TempDir;

    fn snapshot() -> StoreSnapshot {
        let graph = WorkflowGraph::new(vec![Node::new("n1", NodeKind::Terminal)], vec![]);
        let instance = WorkflowInstance::new("acme", "wf", graph, "n1", Default::default(), None);
        StoreSnapshot {
            wal_sequence: 12,
            next_sequence: 40,
            created_at: 1_700_000_000_000,
            instances: vec![InstanceImage {
                instance,
                transitions: Vec::new(),
                action_logs: Vec::new(),
            }],
        }
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        assert!(StoreSnapshot::load(dir.path()).unwrap().is_none());

        let snap = snapshot();
        assert!(snap.write(dir.path()).unwrap() > 0);
        assert_eq!(StoreSnapshot::load(dir.path()).unwrap(), Some(snap));
        assert!(!dir.path().join("snapshot.json.tmp").exists());
    }

    #[test]
    fn test_damaged_snapshot_is_corruption() {
        let dir = TempDir::new().unwrap();
        snapshot().write(dir.path()).unwrap();

        let path = StoreSnapshot::path(dir.path());
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 2;
        raw[last] ^= 0x20;
        fs::write(&path, &raw).unwrap();

        assert!(matches!(
            StoreSnapshot::load(dir.path()),
            Err(StorageError::Corruption(_))
        ));
    }
}
