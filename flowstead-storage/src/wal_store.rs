//! WAL-backed workflow store.

use crate::error::StorageError;
use crate::snapshot::{InstanceImage, StoreSnapshot};
use dashmap::DashMap;
use flowstead_core::history::{sort_action_logs, sort_history};
use flowstead_core::instance::now_millis;
use flowstead_core::{
    ActionLog, CoreError, Step, TransitionRecord, WorkflowInstance, WorkflowStore,
};
use flowstead_wal::{repair_wal, verify_wal, Wal, WalConfig, WalEntry};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of [`WalStore::compact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub instances: usize,
    pub segments_removed: usize,
    pub bytes_before: u64,
    /// Log plus snapshot size afterwards.
    pub bytes_after: u64,
}

/// Durable [`WorkflowStore`]: the log (and the snapshot it was compacted
/// into) is the source of truth, the maps are a replayed cache of it.
pub struct WalStore {
    wal: Wal,

    /// Tenant this store serves. Steps for other tenants are rejected.
    tenant: Option<String>,

    /// Compact once this many entries were logged since the last snapshot.
    /// Zero disables automatic compaction.
    compact_every: u64,

    entries_since_snapshot: AtomicU64,

    /// Held across a log append and the index update it implies, and for a
    /// whole compaction.
    commit_lock: Mutex<()>,

    /// Instances indexed by ID.
    instances: DashMap<String, WorkflowInstance>,

    /// Transition records per instance, in append order.
    transitions: DashMap<String, Vec<TransitionRecord>>,

    /// Action logs per instance, in append order.
    action_logs: DashMap<String, Vec<ActionLog>>,

    /// Next audit sequence number.
    sequence: AtomicU64,
}

impl WalStore {
    /// Opens the store: loads the latest snapshot and replays the log after
    /// it.
    ///
    /// An incomplete record at the very end of the log, as left by a crash
    /// mid-append, is trimmed. Any other damage fails the open with
    /// [`StorageError::Corruption`] and leaves the files untouched.
    pub fn open(config: WalConfig) -> Result<Self, StorageError> {
        let report = verify_wal(&config.dir, config.segment_size)?;
        if !report.is_clean() {
            if !report.is_torn_tail_only() {
                let damage = report
                    .damaged_segments
                    .iter()
                    .map(|d| format!("segment {} at byte {}: {}", d.segment, d.valid_end, d.reason))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(StorageError::Corruption(format!(
                    "WAL {} is damaged ({}); run `flowstead check --repair` to truncate",
                    config.dir.display(),
                    damage
                )));
            }
            repair_wal(&config.dir, config.segment_size)?;
            tracing::warn!(
                dir = %config.dir.display(),
                removed_bytes = report.trailing_bytes,
                "trimmed incomplete record at WAL tail"
            );
        }

        let snapshot = StoreSnapshot::load(&config.dir)?;
        let store = Self {
            wal: Wal::open(config)?,
            tenant: None,
            compact_every: 0,
            entries_since_snapshot: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
            instances: DashMap::new(),
            transitions: DashMap::new(),
            action_logs: DashMap::new(),
            sequence: AtomicU64::new(1),
        };

        let covered = match snapshot {
            Some(snapshot) => store.restore(snapshot)?,
            None => 0,
        };
        store.replay(covered)?;
        Ok(store)
    }

    /// Binds the store to a tenant.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant = Some(tenant_id.into());
        self
    }

    /// Enables automatic compaction after `entries` log entries.
    pub fn with_compact_every(mut self, entries: u64) -> Self {
        self.compact_every = entries;
        self
    }

    /// Loads a snapshot into the indexes. Returns the WAL sequence it covers.
    fn restore(&self, snapshot: StoreSnapshot) -> Result<u64, StorageError> {
        if self.wal.next_sequence() <= snapshot.wal_sequence {
            return Err(StorageError::Corruption(format!(
                "WAL {} ends before its snapshot checkpoint {}",
                self.wal.dir().display(),
                snapshot.wal_sequence
            )));
        }

        for image in snapshot.instances {
            let id = image.instance.id.clone();
            self.transitions.insert(id.clone(), image.transitions);
            self.action_logs.insert(id.clone(), image.action_logs);
            self.instances.insert(id, image.instance);
        }
        self.sequence.store(snapshot.next_sequence, Ordering::SeqCst);
        Ok(snapshot.wal_sequence)
    }

    /// Replays the WAL entries after `covered` to restore state.
    fn replay(&self, covered: u64) -> Result<(), StorageError> {
        let entries = self.wal.read_all()?;
        let mut replayed = 0u64;
        let mut max_sequence = self.sequence.load(Ordering::SeqCst).saturating_sub(1);

        for (seq, _offset, entry) in entries {
            if seq <= covered {
                continue;
            }
            if let Some(audit) = self.replay_entry(entry) {
                max_sequence = max_sequence.max(audit);
            }
            replayed += 1;
        }
        self.sequence.store(max_sequence + 1, Ordering::SeqCst);
        self.entries_since_snapshot.store(replayed, Ordering::SeqCst);

        if replayed > 0 {
            tracing::info!(
                "WAL replay complete: {} entries, {} instances",
                replayed,
                self.instances.len()
            );
        }
        Ok(())
    }

    /// Applies one entry to the indexes. Returns the highest audit sequence
    /// it carried, if any.
    fn replay_entry(&self, entry: WalEntry) -> Option<u64> {
        match entry {
            WalEntry::CommitStep {
                instance_id,
                instance,
                transitions,
                action_logs,
                ..
            } => match decode_step(instance, transitions, action_logs) {
                Ok((instance, transitions, logs)) => {
                    let max = transitions
                        .iter()
                        .map(|r| r.sequence)
                        .chain(logs.iter().map(|l| l.sequence))
                        .max();
                    self.apply_step(instance, transitions, logs);
                    return max;
                }
                Err(e) => {
                    tracing::warn!("Failed to replay step for {}: {}", instance_id, e);
                }
            },

            WalEntry::DeleteInstance { instance_id } => self.remove(&instance_id),

            // Snapshot marker; no in-memory state.
            WalEntry::Checkpoint { .. } => {}
        }
        None
    }

    fn apply_step(
        &self,
        instance: WorkflowInstance,
        transitions: Vec<TransitionRecord>,
        logs: Vec<ActionLog>,
    ) {
        let id = instance.id.clone();
        if !transitions.is_empty() {
            self.transitions.entry(id.clone()).or_default().extend(transitions);
        }
        if !logs.is_empty() {
            self.action_logs.entry(id.clone()).or_default().extend(logs);
        }
        self.instances.insert(id, instance);
    }

    fn remove(&self, instance_id: &str) {
        self.instances.remove(instance_id);
        self.transitions.remove(instance_id);
        self.action_logs.remove(instance_id);
    }

    fn log(&self, entry: &WalEntry) -> Result<(), CoreError> {
        self.wal
            .append(entry)
            .map(|_| ())
            .map_err(|e| StorageError::from(e).into())
    }

    /// Counts a logged entry and compacts when the threshold is reached.
    /// The entry is already durable, so a failed compaction only warns.
    fn after_write(&self) {
        let written = self.entries_since_snapshot.fetch_add(1, Ordering::SeqCst) + 1;
        if self.compact_every == 0 || written < self.compact_every {
            return;
        }
        if let Err(e) = self.compact() {
            tracing::warn!(dir = %self.dir().display(), error = %e, "automatic compaction failed");
        }
    }

    fn check_tenant(&self, tenant_id: &str) -> Result<(), CoreError> {
        match &self.tenant {
            Some(expected) if expected != tenant_id => Err(CoreError::TenantMismatch {
                expected: expected.clone(),
                actual: tenant_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Folds the whole store into a snapshot and deletes the log segments it
    /// covers.
    ///
    /// A `Checkpoint` entry opens a fresh segment; the snapshot records its
    /// sequence so replay skips everything up to it. Once the snapshot is on
    /// disk, older segments are deleted.
    pub fn compact(&self) -> Result<CompactionReport, StorageError> {
        let _guard = self.commit_lock.lock();
        let bytes_before = self.wal.total_size()? + snapshot_size(self.dir());

        self.wal.rotate()?;
        let (wal_sequence, position) = self.wal.append(&WalEntry::Checkpoint {
            timestamp: now_millis(),
        })?;
        self.wal.sync()?;

        let mut instances: Vec<InstanceImage> = self
            .instances
            .iter()
            .map(|r| InstanceImage {
                instance: r.value().clone(),
                transitions: self
                    .transitions
                    .get(r.key())
                    .map(|t| t.value().clone())
                    .unwrap_or_default(),
                action_logs: self
                    .action_logs
                    .get(r.key())
                    .map(|l| l.value().clone())
                    .unwrap_or_default(),
            })
            .collect();
        instances.sort_by(|a, b| a.instance.id.cmp(&b.instance.id));

        let snapshot = StoreSnapshot {
            wal_sequence,
            next_sequence: self.sequence.load(Ordering::SeqCst),
            created_at: now_millis(),
            instances,
        };
        let snapshot_bytes = snapshot.write(self.dir())?;
        let segments_removed = self.wal.compact_before(position)?;
        self.entries_since_snapshot.store(0, Ordering::SeqCst);

        let report = CompactionReport {
            instances: snapshot.instances.len(),
            segments_removed,
            bytes_before,
            bytes_after: self.wal.total_size()? + snapshot_bytes,
        };
        tracing::info!(
            dir = %self.dir().display(),
            instances = report.instances,
            segments_removed,
            bytes_before,
            bytes_after = report.bytes_after,
            "store compacted"
        );
        Ok(report)
    }

    pub fn dir(&self) -> &Path {
        self.wal.dir()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

fn snapshot_size(dir: &Path) -> u64 {
    std::fs::metadata(StoreSnapshot::path(dir))
        .map(|m| m.len())
        .unwrap_or(0)
}

/// Decodes every part of a logged step before any of it is applied.
fn decode_step(
    instance: Value,
    transitions: Vec<Value>,
    action_logs: Vec<Value>,
) -> Result<(WorkflowInstance, Vec<TransitionRecord>, Vec<ActionLog>), serde_json::Error> {
    let instance = serde_json::from_value(instance)?;
    let transitions = transitions
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<TransitionRecord>, _>>()?;
    let logs = action_logs
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<ActionLog>, _>>()?;
    Ok((instance, transitions, logs))
}

fn step_entry(step: &Step) -> Result<WalEntry, CoreError> {
    Ok(WalEntry::CommitStep {
        instance_id: step.instance.id.clone(),
        tenant_id: step.instance.tenant_id.clone(),
        creates: step.creates,
        instance: serde_json::to_value(&step.instance)?,
        transitions: step
            .transitions
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?,
        action_logs: step
            .action_logs
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?,
    })
}

impl WorkflowStore for WalStore {
    fn commit_step(&self, step: &Step) -> Result<(), CoreError> {
        self.check_tenant(&step.instance.tenant_id)?;
        let entry = step_entry(step)?;
        {
            let _guard = self.commit_lock.lock();
            let id = step.instance_id();
            match (self.instances.contains_key(id), step.creates) {
                (true, true) => {
                    return Err(CoreError::InstanceExists {
                        instance_id: id.to_string(),
                    })
                }
                (false, false) => {
                    return Err(CoreError::InstanceNotFound {
                        instance_id: id.to_string(),
                    })
                }
                _ => {}
            }
            self.log(&entry)?;
            self.apply_step(
                step.instance.clone(),
                step.transitions.clone(),
                step.action_logs.clone(),
            );
        }
        self.after_write();
        Ok(())
    }

    fn load_instance(&self, instance_id: &str) -> Result<Option<WorkflowInstance>, CoreError> {
        Ok(self.instances.get(instance_id).map(|r| r.value().clone()))
    }

    fn delete_instance(&self, instance_id: &str) -> Result<bool, CoreError> {
        {
            let _guard = self.commit_lock.lock();
            if !self.instances.contains_key(instance_id) {
                return Ok(false);
            }
            self.log(&WalEntry::DeleteInstance {
                instance_id: instance_id.to_string(),
            })?;
            self.remove(instance_id);
        }
        self.after_write();
        Ok(true)
    }

    fn list_instances(&self, tenant_id: Option<&str>) -> Result<Vec<WorkflowInstance>, CoreError> {
        let mut out: Vec<WorkflowInstance> = self
            .instances
            .iter()
            .filter(|r| tenant_id.map_or(true, |t| r.tenant_id == t))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(out)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn transitions(&self, instance_id: &str) -> Result<Vec<TransitionRecord>, CoreError> {
        let mut records = self
            .transitions
            .get(instance_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        sort_history(&mut records);
        Ok(records)
    }

    fn action_logs(&self, instance_id: &str) -> Result<Vec<ActionLog>, CoreError> {
        let mut logs = self
            .action_logs
            .get(instance_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        sort_action_logs(&mut logs);
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstead_core::{Edge, Node, NodeKind, StartRequest, WorkflowEngine, WorkflowGraph};
    use flowstead_wal::segment::list_segments;
    use flowstead_wal::Segment;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> WalConfig {
        WalConfig::new(dir.path().join("wal")).with_segment_size(1 << 20)
    }

    fn graph() -> WorkflowGraph {
        WorkflowGraph::new(
            vec![
                Node::new("n1", NodeKind::Action).with_label("Send email"),
                Node::new("n2", NodeKind::Condition)
                    .with_property("variable", "amount")
                    .with_property("operator", ">")
                    .with_property("value", "1000"),
                Node::new("n3", NodeKind::Action).with_label("Generate contract"),
                Node::new("n4", NodeKind::Terminal),
            ],
            vec![
                Edge::new("n1", "n2"),
                Edge::labeled("n2", "n3", "true"),
                Edge::labeled("n2", "n4", "false"),
            ],
        )
    }

    fn large_order() -> StartRequest {
        StartRequest::new("acme", "contract", graph())
            .with_context(json!({"amount": 5000}).as_object().cloned().unwrap())
    }

    fn segment_paths(dir: &TempDir) -> Vec<std::path::PathBuf> {
        let wal_dir = dir.path().join("wal");
        list_segments(&wal_dir)
            .unwrap()
            .into_iter()
            .map(|id| wal_dir.join(flowstead_wal::segment::segment_filename(id)))
            .collect()
    }

    #[test]
    fn test_reopen_restores_instance_and_history() {
        let dir = TempDir::new().unwrap();

        let (before, history, logs) = {
            let engine = WorkflowEngine::new(WalStore::open(config(&dir)).unwrap());
            let inst = engine.start(large_order()).unwrap();
            engine.advance(&inst.id, None, None).unwrap();
            let inst = engine.advance(&inst.id, None, None).unwrap();
            assert!(inst.is_completed());
            (
                inst.clone(),
                engine.history(&inst.id).unwrap(),
                engine.action_logs(&inst.id).unwrap(),
            )
        };

        let store = WalStore::open(config(&dir)).unwrap();
        assert_eq!(store.load_instance(&before.id).unwrap().unwrap(), before);
        assert_eq!(store.transitions(&before.id).unwrap(), history);
        assert_eq!(store.action_logs(&before.id).unwrap(), logs);
        assert_eq!(history.len(), 2);
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn test_sequence_continues_after_reopen() {
        let dir = TempDir::new().unwrap();
        let last = {
            let engine = WorkflowEngine::new(WalStore::open(config(&dir)).unwrap());
            let inst = engine.start(StartRequest::new("acme", "c", graph())).unwrap();
            engine.advance(&inst.id, None, None).unwrap();
            engine
                .history(&inst.id)
                .unwrap()
                .last()
                .map(|r| r.sequence)
                .unwrap()
        };

        let store = WalStore::open(config(&dir)).unwrap();
        assert!(store.next_sequence() > last);
    }

    #[test]
    fn test_delete_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let (kept, gone) = {
            let engine = WorkflowEngine::new(WalStore::open(config(&dir)).unwrap());
            let kept = engine.start(StartRequest::new("acme", "c", graph())).unwrap();
            let gone = engine.start(StartRequest::new("acme", "c", graph())).unwrap();
            engine.advance(&gone.id, None, None).unwrap();
            engine.delete(&gone.id).unwrap();
            (kept.id, gone.id)
        };

        let store = WalStore::open(config(&dir)).unwrap();
        assert!(store.load_instance(&kept).unwrap().is_some());
        assert!(store.load_instance(&gone).unwrap().is_none());
        assert!(store.transitions(&gone).unwrap().is_empty());
        assert_eq!(store.instance_count(), 1);
    }

    #[test]
    fn test_torn_tail_is_repaired_on_open() {
        let dir = TempDir::new().unwrap();
        let id = {
            let engine = WorkflowEngine::new(WalStore::open(config(&dir)).unwrap());
            engine.start(StartRequest::new("acme", "c", graph())).unwrap().id
        };

        let segment = segment_paths(&dir).pop().unwrap();
        let mut file = std::fs::OpenOptions::new().append(true).open(&segment).unwrap();
        file.write_all(b"FSWL\x01\x01partial").unwrap();
        drop(file);

        let store = WalStore::open(config(&dir)).unwrap();
        assert!(store.load_instance(&id).unwrap().is_some());

        // The repaired log accepts further writes.
        let engine = WorkflowEngine::new(store);
        engine.advance(&id, None, None).unwrap();
        assert_eq!(engine.history(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupted_record_refuses_open_and_keeps_log() {
        let dir = TempDir::new().unwrap();
        {
            let engine = WorkflowEngine::new(WalStore::open(config(&dir)).unwrap());
            for _ in 0..5 {
                engine.start(StartRequest::new("acme", "c", graph())).unwrap();
            }
        }

        let segment = segment_paths(&dir).remove(0);
        let mut raw = std::fs::read(&segment).unwrap();
        raw[40] ^= 0x01;
        std::fs::write(&segment, &raw).unwrap();

        assert!(matches!(
            WalStore::open(config(&dir)),
            Err(StorageError::Corruption(_))
        ));
        // Nothing was truncated behind the caller's back.
        assert_eq!(std::fs::read(&segment).unwrap(), raw);

        // Explicit repair drops the damaged record and everything after it.
        repair_wal(dir.path().join("wal"), 1 << 20).unwrap();
        assert_eq!(WalStore::open(config(&dir)).unwrap().instance_count(), 0);
    }

    #[test]
    fn test_interrupted_step_is_replayed_whole_or_not_at_all() {
        let dir = TempDir::new().unwrap();
        let id = {
            let engine = WorkflowEngine::new(WalStore::open(config(&dir)).unwrap());
            let inst = engine.start(large_order()).unwrap();
            engine.advance(&inst.id, None, None).unwrap();
            let done = engine.advance(&inst.id, None, None).unwrap();
            assert_eq!(done.current_node_id, "n3");
            assert_eq!(engine.action_logs(&inst.id).unwrap().len(), 2);
            inst.id
        };

        // Cut the last step (n2 -> n3 with its action) mid-record.
        let wal_dir = dir.path().join("wal");
        let last = *list_segments(&wal_dir).unwrap().last().unwrap();
        let mut segment = Segment::open(&wal_dir, last, 1 << 20).unwrap();
        let (offset, _) = segment.read_all().unwrap().pop().unwrap();
        segment.truncate_at(offset + 10).unwrap();
        drop(segment);

        let engine = WorkflowEngine::new(WalStore::open(config(&dir)).unwrap());
        let inst = engine.get(&id).unwrap();
        assert_eq!(inst.current_node_id, "n2");
        assert!(inst.is_running());
        assert_eq!(engine.history(&id).unwrap().len(), 1);
        assert_eq!(engine.action_logs(&id).unwrap().len(), 1);

        engine.advance(&id, None, None).unwrap();
        let hops: Vec<String> = engine
            .history(&id)
            .unwrap()
            .iter()
            .map(|r| format!("{}->{}", r.from_node_id, r.to_node_id))
            .collect();
        assert_eq!(hops, vec!["n1->n2", "n2->n3"]);
        assert_eq!(engine.action_logs(&id).unwrap().len(), 2);
    }

    #[test]
    fn test_compaction_keeps_state_and_drops_segments() {
        let dir = TempDir::new().unwrap();
        let small = || config(&dir).with_segment_size(4096);

        let (ids, report) = {
            let engine = WorkflowEngine::new(WalStore::open(small()).unwrap());
            let mut ids = Vec::new();
            for _ in 0..6 {
                let inst = engine.start(large_order()).unwrap();
                engine.advance(&inst.id, None, None).unwrap();
                ids.push(inst.id);
            }
            engine.delete(&ids.remove(0)).unwrap();
            assert!(segment_paths(&dir).len() > 1);

            let report = engine.store().compact().unwrap();
            (ids, report)
        };

        assert_eq!(report.instances, 5);
        assert!(report.segments_removed > 0);
        assert!(report.bytes_after < report.bytes_before);
        assert_eq!(segment_paths(&dir).len(), 1);
        assert!(StoreSnapshot::path(&dir.path().join("wal")).exists());

        let engine = WorkflowEngine::new(WalStore::open(small()).unwrap());
        assert_eq!(engine.list(None).unwrap().len(), 5);
        for id in &ids {
            assert_eq!(engine.history(id).unwrap().len(), 1);
            assert_eq!(engine.action_logs(id).unwrap().len(), 1);
        }

        // Writes after the snapshot replay on top of it.
        let done = engine.advance(&ids[0], None, None).unwrap();
        assert!(done.is_completed());
        drop(engine);

        let store = WalStore::open(small()).unwrap();
        assert!(store.load_instance(&ids[0]).unwrap().unwrap().is_completed());
        assert_eq!(store.transitions(&ids[0]).unwrap().len(), 2);
        let sequences: Vec<u64> = store
            .transitions(&ids[0])
            .unwrap()
            .iter()
            .map(|r| r.sequence)
            .collect();
        assert!(sequences[1] > sequences[0]);
    }

    #[test]
    fn test_automatic_compaction() {
        let dir = TempDir::new().unwrap();
        let store = WalStore::open(config(&dir)).unwrap().with_compact_every(3);
        let engine = WorkflowEngine::new(store);
        let snapshot = StoreSnapshot::path(&dir.path().join("wal"));

        let inst = engine.start(StartRequest::new("acme", "c", graph())).unwrap();
        engine.advance(&inst.id, None, None).unwrap();
        assert!(!snapshot.exists());

        engine.advance(&inst.id, None, None).unwrap();
        assert!(snapshot.exists());
        drop(engine);

        let store = WalStore::open(config(&dir)).unwrap();
        assert_eq!(store.transitions(&inst.id).unwrap().len(), 2);
    }

    #[test]
    fn test_tenant_bound_store_rejects_other_tenants() {
        let dir = TempDir::new().unwrap();
        let store = WalStore::open(config(&dir)).unwrap().with_tenant("acme");
        let engine = WorkflowEngine::new(store);

        let err = engine
            .start(StartRequest::new("globex", "c", graph()))
            .unwrap_err();
        assert!(matches!(err, CoreError::TenantMismatch { .. }));
        assert!(engine.list(None).unwrap().is_empty());

        assert!(engine.start(StartRequest::new("acme", "c", graph())).is_ok());
    }

    #[test]
    fn test_missing_instance_writes_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = WalStore::open(config(&dir)).unwrap();
        let ghost = WorkflowInstance::new("acme", "c", graph(), "n1", Default::default(), None);
        let record = TransitionRecord {
            sequence: store.next_sequence(),
            instance_id: ghost.id.clone(),
            from_node_id: "n1".to_string(),
            to_node_id: "n2".to_string(),
            edge_label: None,
            condition_evaluated: None,
            action_executed: None,
            created_at: 0,
        };
        assert!(matches!(
            store.commit_step(&Step::update(ghost.clone()).with_transition(record)),
            Err(CoreError::InstanceNotFound { .. })
        ));
        assert!(store.transitions(&ghost.id).unwrap().is_empty());
        assert!(!store.delete_instance(&ghost.id).unwrap());
    }
}
