//! Per-tenant store registry.

use crate::error::StorageError;
use crate::wal_store::WalStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flowstead_wal::{FsyncPolicy, WalConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Checks that `tenant_id` is safe to use as a directory name.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), StorageError> {
    let ok = !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidTenant(tenant_id.to_string()))
    }
}

/// One [`WalStore`] per tenant, opened on first use.
///
/// Layout: `<data_dir>/tenants/<tenant_id>/wal/`.
pub struct TenantStores {
    data_dir: PathBuf,
    segment_size: u64,
    fsync_policy: FsyncPolicy,
    compact_every: u64,
    stores: DashMap<String, Arc<WalStore>>,
}

impl TenantStores {
    pub fn new(data_dir: impl Into<PathBuf>, segment_size: u64, fsync_policy: FsyncPolicy) -> Self {
        Self {
            data_dir: data_dir.into(),
            segment_size,
            fsync_policy,
            compact_every: 0,
            stores: DashMap::new(),
        }
    }

    /// Stores opened from now on compact after `entries` log entries.
    pub fn with_compact_every(mut self, entries: u64) -> Self {
        self.compact_every = entries;
        self
    }

    pub fn tenant_dir(&self, tenant_id: &str) -> PathBuf {
        self.data_dir.join("tenants").join(tenant_id)
    }

    /// WAL settings for a tenant's log.
    pub fn wal_config(&self, tenant_id: &str) -> WalConfig {
        WalConfig::new(self.tenant_dir(tenant_id).join("wal"))
            .with_segment_size(self.segment_size)
            .with_fsync_policy(self.fsync_policy)
    }

    /// Returns the tenant's store, opening (and replaying) it on first use.
    /// The store only accepts instances of that tenant.
    pub fn store(&self, tenant_id: &str) -> Result<Arc<WalStore>, StorageError> {
        validate_tenant_id(tenant_id)?;
        if let Some(store) = self.stores.get(tenant_id) {
            return Ok(store.clone());
        }

        match self.stores.entry(tenant_id.to_string()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(slot) => {
                let store = WalStore::open(self.wal_config(tenant_id))?
                    .with_tenant(tenant_id)
                    .with_compact_every(self.compact_every);
                let store = Arc::new(store);
                tracing::info!(
                    tenant_id,
                    instances = store.instance_count(),
                    "tenant store opened"
                );
                slot.insert(store.clone());
                Ok(store)
            }
        }
    }

    /// Tenants with data on disk, sorted.
    pub fn tenants(&self) -> Result<Vec<String>, StorageError> {
        let root = self.data_dir.join("tenants");
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_tenant_id(name).is_ok() {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }
}
