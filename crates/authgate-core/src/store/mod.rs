//! Durable key-value storage for the persisted session mirror.
//!
//! This module provides:
//! - `DurableStore`: the async get/set/remove seam the session core writes through
//! - `MemoryStore`: in-process map, for tests and embedding
//! - `FileStore`: a JSON file in the platform data directory
//! - `KeyringStore`: OS keychain entries, one per key

pub mod file;
pub mod keyring;
pub mod memory;

use async_trait::async_trait;

use crate::error::SessionResult;

pub use file::FileStore;
pub use keyring::KeyringStore;
pub use memory::MemoryStore;

/// Key-value persistence that survives process restarts.
///
/// Every failure is reported as `SessionError::StorageUnavailable`; callers in
/// the session core log it and carry on.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> SessionResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> SessionResult<()>;
    async fn remove(&self, key: &str) -> SessionResult<()>;
}
