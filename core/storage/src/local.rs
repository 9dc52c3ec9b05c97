//! Local filesystem stores.
//!
//! Each store keeps a single JSON document inside the vault directory.
//! Writes go to a temporary sibling file that is then renamed over the
//! original, so a crash never leaves a half-written document.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::entry::{sort_newest_first, StoredEntry};
use crate::store::{EntryStore, PreferenceStore};
use nanovault_common::{EntryId, Error, Result};

/// Entries file name in the vault directory.
pub const ENTRIES_FILENAME: &str = "entries.json";

/// Preferences file name in the vault directory.
pub const PREFS_FILENAME: &str = "prefs.json";

async fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read(path).await {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| Error::Serialization(e.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(Error::Storage(format!("Failed to read {}: {}", path.display(), e))),
    }
}

async fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::Serialization(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, &bytes)
        .await
        .map_err(|e| Error::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Storage(format!("Failed to replace {}: {}", path.display(), e)))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Document written");
    Ok(())
}

fn ensure_root(root: &Path) -> Result<()> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
    }
    Ok(())
}

/// Entry store backed by `entries.json`.
///
/// Batches commit atomically because the whole document is replaced by a
/// single rename.
pub struct LocalEntryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalEntryStore {
    /// Create a store rooted at the given vault directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        ensure_root(root)?;
        Ok(Self {
            path: root.join(ENTRIES_FILENAME),
            write_lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<BTreeMap<EntryId, StoredEntry>> {
        let entries: Vec<StoredEntry> = read_document(&self.path).await?;
        Ok(entries.into_iter().map(|e| (e.id, e)).collect())
    }

    async fn save(&self, entries: BTreeMap<EntryId, StoredEntry>) -> Result<()> {
        let entries: Vec<StoredEntry> = entries.into_values().collect();
        write_document(&self.path, &entries).await
    }
}

#[async_trait]
impl EntryStore for LocalEntryStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(&self) -> Result<Vec<StoredEntry>> {
        let mut entries: Vec<StoredEntry> = self.load().await?.into_values().collect();
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn get(&self, id: &EntryId) -> Result<Option<StoredEntry>> {
        Ok(self.load().await?.remove(id))
    }

    async fn put(&self, entry: StoredEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(entry.id, entry);
        self.save(entries).await
    }

    async fn delete(&self, id: &EntryId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(id).is_none() {
            return Err(Error::NotFound(format!("Entry not found: {}", id)));
        }
        self.save(entries).await
    }

    async fn commit_batch(&self, batch: Vec<StoredEntry>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        for entry in batch {
            entries.insert(entry.id, entry);
        }
        self.save(entries).await
    }

    fn atomic_batches(&self) -> bool {
        true
    }
}

/// Preference store backed by `prefs.json`.
///
/// Values are stored base64-encoded so the document stays valid JSON.
pub struct LocalPreferenceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalPreferenceStore {
    /// Create a store rooted at the given vault directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        ensure_root(root)?;
        Ok(Self {
            path: root.join(PREFS_FILENAME),
            write_lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        read_document(&self.path).await
    }
}

#[async_trait]
impl PreferenceStore for LocalPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.load().await?.get(key) {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| Error::MalformedInput(format!("Preference '{}': {}", key, e))),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), STANDARD.encode(value));
        write_document(&self.path, &values).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            write_document(&self.path, &values).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nanovault_crypto::encrypt;
    use tempfile::TempDir;

    fn entry(service: &str) -> StoredEntry {
        let key = [6u8; 32];
        StoredEntry {
            id: EntryId::new(),
            service_name: service.to_string(),
            username: encrypt(&key, b"user").unwrap().to_base64(),
            password: encrypt(&key, b"pass").unwrap().to_base64(),
            notes: Some(encrypt(&key, b"notes").unwrap().to_base64()),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_local_entries_persist() {
        let temp = TempDir::new().unwrap();
        let e = entry("example.com");
        let id = e.id;

        {
            let store = LocalEntryStore::new(temp.path()).unwrap();
            store.put(e.clone()).await.unwrap();
        }

        let reopened = LocalEntryStore::new(temp.path()).unwrap();
        assert_eq!(reopened.get(&id).await.unwrap(), Some(e));
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_local_empty_and_delete() {
        let temp = TempDir::new().unwrap();
        let store = LocalEntryStore::new(temp.path()).unwrap();
        assert!(store.list().await.unwrap().is_empty());

        let e = entry("a");
        let id = e.id;
        store.put(e).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(store.delete(&id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_commit_batch_replaces() {
        let temp = TempDir::new().unwrap();
        let store = LocalEntryStore::new(temp.path()).unwrap();

        let mut e = entry("a");
        store.put(e.clone()).await.unwrap();

        e.service_name = "renamed".to_string();
        store.commit_batch(vec![e.clone(), entry("b")]).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.get(&e.id).await.unwrap().unwrap().service_name, "renamed");
        assert!(!temp.path().join("entries.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_local_preferences() {
        let temp = TempDir::new().unwrap();
        let prefs = LocalPreferenceStore::new(temp.path()).unwrap();

        prefs.put("blob", vec![0, 255, 7]).await.unwrap();

        let reopened = LocalPreferenceStore::new(temp.path()).unwrap();
        assert_eq!(reopened.get("blob").await.unwrap(), Some(vec![0, 255, 7]));

        reopened.remove("blob").await.unwrap();
        assert!(reopened.get("blob").await.unwrap().is_none());
    }
}
