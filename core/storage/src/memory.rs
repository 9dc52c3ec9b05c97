//! In-memory stores for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entry::{sort_newest_first, StoredEntry};
use crate::store::{EntryStore, PreferenceStore};
use nanovault_common::{EntryId, Error, Result};

fn read_guard<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| Error::Storage("Store lock poisoned".to_string()))
}

fn write_guard<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| Error::Storage("Store lock poisoned".to_string()))
}

/// In-memory entry store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Batches commit atomically.
pub struct MemoryEntryStore {
    entries: Arc<RwLock<HashMap<EntryId, StoredEntry>>>,
    fail_puts_after: Arc<AtomicUsize>,
    fail_enabled: Arc<AtomicBool>,
}

impl MemoryEntryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            fail_puts_after: Arc::new(AtomicUsize::new(0)),
            fail_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make writes fail with `Storage` after `n` more successful writes.
    ///
    /// Test hook for exercising partial-failure paths.
    pub fn fail_writes_after(&self, n: usize) {
        self.fail_puts_after.store(n, Ordering::SeqCst);
        self.fail_enabled.store(true, Ordering::SeqCst);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_write(&self) -> Result<()> {
        if !self.fail_enabled.load(Ordering::SeqCst) {
            return Ok(());
        }
        let remaining = self.fail_puts_after.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(Error::Storage("Injected write failure".to_string()));
        }
        self.fail_puts_after.store(remaining - 1, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for MemoryEntryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<StoredEntry>> {
        let mut entries: Vec<StoredEntry> = read_guard(&self.entries)?.values().cloned().collect();
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn get(&self, id: &EntryId) -> Result<Option<StoredEntry>> {
        Ok(read_guard(&self.entries)?.get(id).cloned())
    }

    async fn put(&self, entry: StoredEntry) -> Result<()> {
        self.check_write()?;
        write_guard(&self.entries)?.insert(entry.id, entry);
        Ok(())
    }

    async fn delete(&self, id: &EntryId) -> Result<()> {
        self.check_write()?;
        match write_guard(&self.entries)?.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Entry not found: {}", id))),
        }
    }

    async fn commit_batch(&self, entries: Vec<StoredEntry>) -> Result<()> {
        self.check_write()?;
        let mut guard = write_guard(&self.entries)?;
        for entry in entries {
            guard.insert(entry.id, entry);
        }
        Ok(())
    }

    fn atomic_batches(&self) -> bool {
        true
    }
}

/// In-memory preference store.
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryPreferenceStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryPreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(read_guard(&self.values)?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        write_guard(&self.values)?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        write_guard(&self.values)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use nanovault_crypto::encrypt;

    fn entry(service: &str, age_secs: i64) -> StoredEntry {
        let key = [4u8; 32];
        StoredEntry {
            id: EntryId::new(),
            service_name: service.to_string(),
            username: encrypt(&key, b"user").unwrap().to_base64(),
            password: encrypt(&key, b"pass").unwrap().to_base64(),
            notes: None,
            timestamp: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryEntryStore::new();
        let e = entry("a", 0);
        let id = e.id;

        store.put(e.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(e));

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(matches!(store.delete(&id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = MemoryEntryStore::new();
        store.put(entry("old", 100)).await.unwrap();
        store.put(entry("new", 0)).await.unwrap();
        store.put(entry("mid", 50)).await.unwrap();

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.service_name)
            .collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryEntryStore::new();
        store.fail_writes_after(1);

        store.put(entry("first", 0)).await.unwrap();
        assert!(matches!(
            store.put(entry("second", 0)).await,
            Err(Error::Storage(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_batch_is_atomic() {
        let store = MemoryEntryStore::new();
        let batch = vec![entry("a", 0), entry("b", 0), entry("c", 0)];

        store.fail_writes_after(0);
        assert!(store.commit_batch(batch.clone()).await.is_err());
        assert!(store.is_empty());

        let store = MemoryEntryStore::new();
        store.commit_batch(batch).await.unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.atomic_batches());
    }

    #[tokio::test]
    async fn test_preferences() {
        let prefs = MemoryPreferenceStore::new();

        assert!(prefs.get("k").await.unwrap().is_none());
        prefs.put("k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(prefs.get("k").await.unwrap(), Some(vec![1, 2, 3]));
        assert!(prefs.contains("k").await.unwrap());

        prefs.remove("k").await.unwrap();
        prefs.remove("k").await.unwrap();
        assert!(!prefs.contains("k").await.unwrap());
    }
}
