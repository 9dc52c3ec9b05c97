//! Bulk re-encryption for master password changes.
//!
//! Runs in two phases. [`stage`] reads one snapshot of the store, decrypts
//! every entry with the old key and seals it again with the new key, all in
//! memory. [`StagedReencryption::commit`] then writes the batch through
//! [`EntryStore::commit_batch`]. With `AbortOnError` a decryption failure
//! stops the run before anything is written.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entry::VaultEntry;
use nanovault_common::{EntryId, Result};
use nanovault_crypto::VaultKey;
use nanovault_storage::{EntryStore, StoredEntry};

/// How to treat an entry that does not decrypt under the old key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReencryptPolicy {
    /// Fail the whole run and write nothing.
    #[default]
    AbortOnError,
    /// Leave the entry as-is and report its id. The entry stays sealed
    /// under the old key and becomes unreadable after the change.
    SkipAndReport,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReencryptOutcome {
    /// Entries written under the new key.
    pub reencrypted: usize,
    /// Entries skipped under `SkipAndReport`.
    pub skipped: Vec<EntryId>,
}

/// Re-sealed entries waiting to be written.
#[derive(Debug)]
pub struct StagedReencryption {
    staged: Vec<StoredEntry>,
    originals: Vec<StoredEntry>,
    skipped: Vec<EntryId>,
}

impl StagedReencryption {
    /// Number of entries ready to commit.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Ids skipped during staging.
    pub fn skipped(&self) -> &[EntryId] {
        &self.skipped
    }

    /// Write the staged entries.
    ///
    /// Returns the originals so the caller can restore them if a later step
    /// of the password change fails.
    pub async fn commit(self, store: &dyn EntryStore) -> Result<(ReencryptOutcome, Vec<StoredEntry>)> {
        let reencrypted = self.staged.len();
        store.commit_batch(self.staged).await?;

        info!(
            reencrypted,
            skipped = self.skipped.len(),
            atomic = store.atomic_batches(),
            "Re-encryption committed"
        );

        Ok((
            ReencryptOutcome {
                reencrypted,
                skipped: self.skipped,
            },
            self.originals,
        ))
    }
}

/// Decrypt every entry with `old_key` and seal it again with `new_key`.
///
/// Nothing is written to the store.
///
/// # Errors
/// - Store read failure
/// - First decryption failure under `AbortOnError`
pub async fn stage(
    store: &dyn EntryStore,
    old_key: &VaultKey,
    new_key: &VaultKey,
    policy: ReencryptPolicy,
) -> Result<StagedReencryption> {
    let snapshot = store.list().await?;
    let mut staged = Vec::with_capacity(snapshot.len());
    let mut originals = Vec::with_capacity(snapshot.len());
    let mut skipped = Vec::new();

    for stored in snapshot {
        let plain = match VaultEntry::open(&stored, old_key) {
            Ok(plain) => plain,
            Err(e) => match policy {
                ReencryptPolicy::AbortOnError => {
                    warn!(entry = %stored.id, error = %e, "Re-encryption aborted: entry unreadable");
                    return Err(e);
                }
                ReencryptPolicy::SkipAndReport => {
                    warn!(entry = %stored.id, error = %e, "Re-encryption skipped unreadable entry");
                    skipped.push(stored.id);
                    continue;
                }
            },
        };

        staged.push(plain.seal(new_key)?);
        originals.push(stored);
    }

    Ok(StagedReencryption {
        staged,
        originals,
        skipped,
    })
}

/// Re-encrypt every stored entry from `old_key` to `new_key`.
///
/// One-shot procedure: stage, then commit.
pub async fn reencrypt_all(
    store: &dyn EntryStore,
    old_key: &VaultKey,
    new_key: &VaultKey,
    policy: ReencryptPolicy,
) -> Result<ReencryptOutcome> {
    let staged = stage(store, old_key, new_key, policy).await?;
    let (outcome, _) = staged.commit(store).await?;
    Ok(outcome)
}
