//! Store trait definitions.

use async_trait::async_trait;

use crate::entry::StoredEntry;
use nanovault_common::{EntryId, Result};

/// Well-known preference keys.
pub mod keys {
    /// Serialized `MasterSecretRecord`.
    pub const MASTER_SECRET: &str = "master_secret";
    /// Base64 `iv || ciphertext` of the hardware-wrapped vault key.
    pub const WRAPPED_KEY: &str = "biometric_wrapped_key";
}

/// Persistent store for encrypted vault entries.
///
/// Implementations must be safe to share across tasks. No transactional
/// guarantee is assumed beyond what [`EntryStore::commit_batch`] documents.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Get the store name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Snapshot of all entries, newest first.
    async fn list(&self) -> Result<Vec<StoredEntry>>;

    /// Fetch a single entry.
    async fn get(&self, id: &EntryId) -> Result<Option<StoredEntry>>;

    /// Insert or replace an entry by id.
    async fn put(&self, entry: StoredEntry) -> Result<()>;

    /// Delete an entry.
    ///
    /// # Errors
    /// - Entry not found
    async fn delete(&self, id: &EntryId) -> Result<()>;

    /// Write a batch of entries, replacing any with the same id.
    ///
    /// The default implementation issues one `put` per entry, so a failure
    /// part-way leaves earlier entries written. Stores that can commit the
    /// whole batch atomically should override this.
    async fn commit_batch(&self, entries: Vec<StoredEntry>) -> Result<()> {
        for entry in entries {
            self.put(entry).await?;
        }
        Ok(())
    }

    /// Whether [`EntryStore::commit_batch`] is all-or-nothing.
    fn atomic_batches(&self) -> bool {
        false
    }
}

/// Small key-value store for secrets metadata.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, replacing any existing one.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Check whether a key is present.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
