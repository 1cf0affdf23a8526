//! # flowstead-storage
//!
//! Durable workflow stores.
//!
//! [`WalStore`] implements the engine's `WorkflowStore` on top of the
//! write-ahead log: every engine step is appended to the log as one entry
//! before it touches the in-memory indexes, and the indexes are rebuilt by
//! replay on open. Compaction folds the log into a [`StoreSnapshot`].
//! [`TenantStores`] hands out one such store per tenant.

pub mod error;
pub mod snapshot;
pub mod tenants;
pub mod wal_store;

pub use error::StorageError;
pub use snapshot::StoreSnapshot;
pub use tenants::{validate_tenant_id, TenantStores};
pub use wal_store::{CompactionReport, WalStore};
