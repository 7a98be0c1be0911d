//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between callers and the storage engines. They are
//! defined here (in `app`) so that both callers and the adapter layer can
//! depend on them without creating circular dependencies.

pub mod storage;

pub use storage::StorageAdapter;
