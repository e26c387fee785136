use std::collections::{hash_map, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use super::DurableStore;
use crate::error::{SessionError, SessionResult};

/// Default keychain service name
pub const SERVICE_NAME: &str = "authgate";

/// Stores each key as its own entry in the OS keychain.
///
/// Entries are created once per key and reused for the life of the store.
pub struct KeyringStore {
    service: String,
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_entry<T>(&self, key: &str, f: impl FnOnce(&Entry) -> T) -> SessionResult<T> {
        let mut entries = self.lock();
        let entry = match entries.entry(key.to_string()) {
            hash_map::Entry::Occupied(slot) => slot.into_mut(),
            hash_map::Entry::Vacant(slot) => slot.insert(
                Entry::new(&self.service, key)
                    .map_err(|e| SessionError::storage("Failed to create keyring entry", e))?,
            ),
        };
        Ok(f(entry))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

#[async_trait]
impl DurableStore for KeyringStore {
    async fn get(&self, key: &str) -> SessionResult<Option<String>> {
        match self.with_entry(key, Entry::get_password)? {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SessionError::storage("Failed to read from keychain", e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> SessionResult<()> {
        self.with_entry(key, |entry| entry.set_password(value))?
            .map_err(|e| SessionError::storage("Failed to store value in keychain", e))?;
        debug!(service = %self.service, key, "Stored keychain entry");
        Ok(())
    }

    async fn remove(&self, key: &str) -> SessionResult<()> {
        match self.with_entry(key, Entry::delete_credential)? {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SessionError::storage("Failed to delete keychain entry", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_store() -> KeyringStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeyringStore::new("authgate-test")
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = mock_store();

        store.set("token", "abc").await.unwrap();
        assert_eq!(store.get("token").await.unwrap().as_deref(), Some("abc"));

        store.set("token", "def").await.unwrap();
        assert_eq!(store.get("token").await.unwrap().as_deref(), Some("def"));

        store.remove("token").await.unwrap();
        assert_eq!(store.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_entry_reads_as_none() {
        let store = mock_store();
        assert_eq!(store.get("tokenTimestamp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_missing_entry_is_ok() {
        let store = mock_store();
        store.remove("token").await.unwrap();
        store.remove("token").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = mock_store();
        store.set("token", "abc").await.unwrap();
        store.set("tokenTimestamp", "1700000000000").await.unwrap();

        store.remove("token").await.unwrap();
        assert_eq!(store.get("token").await.unwrap(), None);
        assert_eq!(
            store.get("tokenTimestamp").await.unwrap().as_deref(),
            Some("1700000000000")
        );
    }
}
