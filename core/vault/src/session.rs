//! Vault session lifecycle.
//!
//! A [`VaultSession`] owns the live vault key. The key, the lifecycle state
//! and the last-activity instant share one mutex, so checking that the vault
//! is unlocked and copying the key out happen under the same guard. Entry
//! operations work on that copy, which zeroizes on drop.
//!
//! Slow work (Argon2id, biometric ceremonies, store I/O for bulk
//! re-encryption) never runs with the slot mutex held.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::config::SessionConfig;
use crate::entry::{EntryListing, NewEntry, VaultEntry};
use crate::reencrypt::{self, ReencryptOutcome};
use nanovault_common::{EntryId, Error, Result};
use nanovault_crypto::master::{self, MasterSecretRecord};
use nanovault_crypto::VaultKey;
use nanovault_keywrap::KeyWrapCapability;
use nanovault_storage::{keys, EntryStore, PreferenceStore};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No master password has been set up.
    NoMasterSecret,
    /// A master password exists; no key is in memory.
    Locked,
    /// The vault key is live.
    Unlocked,
    /// A master password change is rewriting entries.
    ReEncrypting,
}

/// Why the session locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Explicit,
    IdleTimeout,
    Background,
    ReencryptionComplete,
}

/// Options for [`VaultSession::change_master_password`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangePasswordOptions {
    /// Wrap the new key for biometric unlock (one ceremony) instead of
    /// disabling biometric unlock.
    pub reenroll_biometric: bool,
}

struct Slot {
    state: LifecycleState,
    key: Option<VaultKey>,
    last_activity: Instant,
}

/// Explicit session context shared by front ends through an `Arc`.
pub struct VaultSession {
    config: SessionConfig,
    entries: Arc<dyn EntryStore>,
    prefs: Arc<dyn PreferenceStore>,
    key_wrap: KeyWrapCapability,
    slot: Mutex<Slot>,
    /// Held by every entry mutation and for the whole of a re-encryption.
    entry_write_lock: Mutex<()>,
}

async fn run_kdf<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Crypto(format!("Key derivation task failed: {}", e)))
}

fn password_bytes(password: &str) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(password.as_bytes().to_vec())
}

impl VaultSession {
    /// Open a session over the given stores.
    ///
    /// Starts `Locked` if a master password record exists, otherwise
    /// `NoMasterSecret`.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Preference store read failure
    pub async fn new(
        config: SessionConfig,
        entries: Arc<dyn EntryStore>,
        prefs: Arc<dyn PreferenceStore>,
        key_wrap: KeyWrapCapability,
    ) -> Result<Self> {
        config.validate()?;

        let state = if prefs.contains(keys::MASTER_SECRET).await? {
            LifecycleState::Locked
        } else {
            LifecycleState::NoMasterSecret
        };

        info!(
            ?state,
            store = entries.name(),
            biometric = key_wrap.is_available(),
            "Vault session opened"
        );

        Ok(Self {
            config,
            entries,
            prefs,
            key_wrap,
            slot: Mutex::new(Slot {
                state,
                key: None,
                last_activity: Instant::now(),
            }),
            entry_write_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn state(&self) -> LifecycleState {
        self.slot.lock().await.state
    }

    pub async fn is_master_password_set(&self) -> Result<bool> {
        self.prefs.contains(keys::MASTER_SECRET).await
    }

    /// The single path into `Locked`. Scrubs the key before dropping it.
    fn enter_locked(slot: &mut Slot, reason: LockReason) {
        if let Some(mut key) = slot.key.take() {
            key.zeroize();
        }
        slot.state = LifecycleState::Locked;
        info!(?reason, "Vault locked");
    }

    /// Copy the live key out for one operation.
    async fn snapshot_key(&self) -> Result<VaultKey> {
        let mut slot = self.slot.lock().await;
        match slot.state {
            LifecycleState::Unlocked => {
                let key = slot.key.clone().ok_or(Error::Locked)?;
                slot.last_activity = Instant::now();
                Ok(key)
            }
            LifecycleState::ReEncrypting => Err(Error::Busy),
            LifecycleState::Locked => Err(Error::Locked),
            LifecycleState::NoMasterSecret => Err(Error::NoMasterSecret),
        }
    }

    /// Install a verified key.
    async fn adopt(&self, key: VaultKey) -> Result<()> {
        let mut slot = self.slot.lock().await;
        match slot.state {
            LifecycleState::Locked | LifecycleState::Unlocked => {
                slot.key = Some(key);
                slot.state = LifecycleState::Unlocked;
                slot.last_activity = Instant::now();
                info!("Vault unlocked");
                Ok(())
            }
            LifecycleState::ReEncrypting => Err(Error::Busy),
            LifecycleState::NoMasterSecret => Err(Error::NoMasterSecret),
        }
    }

    /// Refuse to unlock from states where unlocking makes no sense.
    async fn ensure_unlockable(&self) -> Result<bool> {
        match self.slot.lock().await.state {
            LifecycleState::Locked => Ok(true),
            LifecycleState::Unlocked => Ok(false),
            LifecycleState::ReEncrypting => Err(Error::Busy),
            LifecycleState::NoMasterSecret => Err(Error::NoMasterSecret),
        }
    }

    /// Take the entry write lock and a key snapshot.
    ///
    /// A password change holds the write lock for its whole run. A mutation
    /// that finds the lock taken checks the state before queueing, so it
    /// fails with `Busy` instead of waiting out a re-encryption.
    async fn begin_write(&self) -> Result<(MutexGuard<'_, ()>, VaultKey)> {
        let guard = match self.entry_write_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.snapshot_key().await?;
                self.entry_write_lock.lock().await
            }
        };
        let key = self.snapshot_key().await?;
        Ok((guard, key))
    }

    async fn load_record(&self) -> Result<MasterSecretRecord> {
        let bytes = self
            .prefs
            .get(keys::MASTER_SECRET)
            .await?
            .ok_or(Error::NoMasterSecret)?;
        MasterSecretRecord::from_bytes(&bytes)
    }

    /// Create the master password record.
    ///
    /// Weak passwords are accepted; see [`crate::check_password_strength`].
    ///
    /// # Errors
    /// - `AlreadyInitialized` if a record exists
    /// - `InvalidInput` for an empty password
    pub async fn setup_master_password(&self, password: &str) -> Result<()> {
        if self.state().await != LifecycleState::NoMasterSecret {
            return Err(Error::AlreadyInitialized);
        }

        let pw = password_bytes(password);
        let params = self.config.kdf.clone();
        let (record, key) = run_kdf(move || master::setup(&pw, &params)).await??;

        let mut slot = self.slot.lock().await;
        if slot.state != LifecycleState::NoMasterSecret {
            return Err(Error::AlreadyInitialized);
        }
        self.prefs
            .put(keys::MASTER_SECRET, record.to_bytes()?)
            .await?;

        if self.config.unlock_after_setup {
            slot.key = Some(key);
            slot.state = LifecycleState::Unlocked;
            slot.last_activity = Instant::now();
            info!("Master password set up; vault unlocked");
        } else {
            drop(key);
            slot.state = LifecycleState::Locked;
            info!("Master password set up");
        }
        Ok(())
    }

    /// Check a password without changing state.
    ///
    /// # Errors
    /// - `NoMasterSecret` if no record exists
    /// - Record unreadable
    pub async fn verify_master_password(&self, password: &str) -> Result<Option<VaultKey>> {
        let record = self.load_record().await?;
        let pw = password_bytes(password);
        run_kdf(move || master::verify(&pw, &record)).await
    }

    /// Unlock with the master password.
    ///
    /// # Errors
    /// - `WrongPassword` on mismatch; the session stays `Locked`
    /// - `NoMasterSecret`, `Busy` from the wrong state
    pub async fn unlock_with_password(&self, password: &str) -> Result<()> {
        if !self.ensure_unlockable().await? {
            return Ok(());
        }

        match self.verify_master_password(password).await? {
            Some(key) => self.adopt(key).await,
            None => {
                info!("Password unlock rejected");
                Err(Error::WrongPassword)
            }
        }
    }

    /// Change the master password and re-encrypt every entry.
    ///
    /// Requires `Unlocked`. Ends `Locked` whether or not it succeeds, with
    /// both keys scrubbed. Biometric unlock is either re-enrolled with the
    /// new key or disabled, per `options`.
    ///
    /// # Errors
    /// - `WrongPassword` if `old` does not verify; the session stays unlocked
    /// - `Locked`, `Busy`, `NoMasterSecret` from the wrong state
    /// - Re-encryption or store failures; entries are restored on a failed
    ///   record write
    pub async fn change_master_password(
        &self,
        old: &str,
        new: &str,
        options: ChangePasswordOptions,
    ) -> Result<ReencryptOutcome> {
        let _write = self.entry_write_lock.lock().await;

        // Fail fast on state before paying for the KDF.
        self.snapshot_key().await?;
        if new.is_empty() {
            return Err(Error::InvalidInput("Password cannot be empty".to_string()));
        }

        let old_key = match self.verify_master_password(old).await? {
            Some(key) => key,
            None => {
                info!("Password change rejected: old password mismatch");
                return Err(Error::WrongPassword);
            }
        };

        {
            let mut slot = self.slot.lock().await;
            match slot.state {
                LifecycleState::Unlocked => slot.state = LifecycleState::ReEncrypting,
                LifecycleState::ReEncrypting => return Err(Error::Busy),
                LifecycleState::Locked => return Err(Error::Locked),
                LifecycleState::NoMasterSecret => return Err(Error::NoMasterSecret),
            }
        }
        info!("Re-encryption started");

        let result = self.rekey(old_key, new, options).await;

        let mut slot = self.slot.lock().await;
        Self::enter_locked(&mut slot, LockReason::ReencryptionComplete);
        result
    }

    async fn rekey(
        &self,
        old_key: VaultKey,
        new: &str,
        options: ChangePasswordOptions,
    ) -> Result<ReencryptOutcome> {
        let pw = password_bytes(new);
        let params = self.config.kdf.clone();
        let (record, new_key) = run_kdf(move || master::setup(&pw, &params)).await??;

        let staged = reencrypt::stage(
            self.entries.as_ref(),
            &old_key,
            &new_key,
            self.config.reencrypt_policy,
        )
        .await?;
        let (outcome, originals) = staged.commit(self.entries.as_ref()).await?;

        let persisted = match record.to_bytes() {
            Ok(bytes) => self.prefs.put(keys::MASTER_SECRET, bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            warn!(error = %e, "Failed to persist new master record; restoring entries");
            if let Err(rollback) = self.entries.commit_batch(originals).await {
                error!(error = %rollback, "Entry rollback failed");
            }
            return Err(e);
        }
        info!("Master password changed");

        self.refresh_biometric(&new_key, options).await;
        Ok(outcome)
    }

    /// The old wrapped key no longer matches the record after a change.
    async fn refresh_biometric(&self, new_key: &VaultKey, options: ChangePasswordOptions) {
        let wrapper = match self.key_wrap.wrapper() {
            Ok(wrapper) => wrapper,
            Err(_) => return,
        };
        match wrapper.is_enrolled().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => warn!(error = %e, "Could not read biometric enrollment"),
        }

        if options.reenroll_biometric {
            match wrapper.enroll(new_key).await {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "Biometric re-enrollment failed; disabling"),
            }
        }
        if let Err(e) = wrapper.evict().await {
            warn!(error = %e, "Failed to disable biometric unlock");
        }
    }

    /// Wrap the live key under the hardware key (one ceremony) and persist it.
    ///
    /// # Errors
    /// - `HardwareUnavailable` when the device has no key wrap support
    /// - `Locked` unless unlocked
    /// - Ceremony errors; nothing is enabled on failure
    pub async fn enable_biometric_unlock(&self) -> Result<()> {
        let wrapper = self.key_wrap.wrapper()?;
        let key = self.snapshot_key().await?;
        wrapper.enroll(&key).await
    }

    /// Delete the wrap key and wrapped blob.
    pub async fn disable_biometric_unlock(&self) -> Result<()> {
        self.key_wrap.wrapper()?.evict().await
    }

    /// `false` on devices without key wrap support.
    pub async fn is_biometric_enabled(&self) -> Result<bool> {
        match self.key_wrap.wrapper() {
            Ok(wrapper) => wrapper.is_enrolled().await,
            Err(_) => Ok(false),
        }
    }

    /// Unlock by unwrapping the stored key after a fresh ceremony.
    ///
    /// # Errors
    /// - `HardwareUnavailable`, `AuthenticationCanceled`,
    ///   `AuthenticationFailed` from the ceremony; the session stays `Locked`
    /// - `NotFound` if biometric unlock is not enabled
    /// - `AuthenticationFailure` if the unwrapped key is not the vault key
    pub async fn unlock_with_biometric(&self) -> Result<()> {
        let wrapper = self.key_wrap.wrapper()?;
        if !self.ensure_unlockable().await? {
            return Ok(());
        }

        let key = match wrapper.unwrap_stored().await {
            Ok(key) => key,
            Err(e) => {
                info!(error = %e, "Biometric unlock did not complete");
                return Err(e);
            }
        };

        if !self.load_record().await?.matches_key(&key) {
            warn!("Unwrapped key does not match the master record");
            return Err(Error::AuthenticationFailure);
        }
        self.adopt(key).await
    }

    /// Lock now. No effect while re-encrypting or before setup.
    pub async fn lock(&self) {
        self.lock_for(LockReason::Explicit).await;
    }

    /// The host app moved to the background.
    pub async fn on_background(&self) {
        self.lock_for(LockReason::Background).await;
    }

    async fn lock_for(&self, reason: LockReason) {
        let mut slot = self.slot.lock().await;
        match slot.state {
            LifecycleState::Unlocked | LifecycleState::Locked => {
                Self::enter_locked(&mut slot, reason)
            }
            LifecycleState::ReEncrypting => debug!(?reason, "Lock deferred during re-encryption"),
            LifecycleState::NoMasterSecret => {}
        }
    }

    /// Record user activity.
    pub async fn touch(&self) {
        let mut slot = self.slot.lock().await;
        if slot.state == LifecycleState::Unlocked {
            slot.last_activity = Instant::now();
        }
    }

    /// Lock if the idle timeout has passed. Returns `true` if this call locked.
    pub async fn check_idle(&self) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.state == LifecycleState::Unlocked
            && slot.last_activity.elapsed() >= self.config.idle_timeout()
        {
            Self::enter_locked(&mut slot, LockReason::IdleTimeout);
            return true;
        }
        false
    }

    /// Encrypt and store a new entry.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty service name
    /// - `Locked`, `Busy`
    pub async fn add_entry(&self, new: NewEntry) -> Result<EntryId> {
        if new.service_name.trim().is_empty() {
            return Err(Error::InvalidInput("Service name cannot be empty".to_string()));
        }

        let (_write, key) = self.begin_write().await?;

        let entry = VaultEntry::from_new(&new);
        self.entries.put(entry.seal(&key)?).await?;

        debug!(entry = %entry.id, "Entry added");
        Ok(entry.id)
    }

    /// Replace an entry's fields. Every field gets a fresh nonce and the
    /// timestamp is refreshed.
    ///
    /// # Errors
    /// - `NotFound` if no such entry
    pub async fn update_entry(&self, id: &EntryId, fields: NewEntry) -> Result<()> {
        if fields.service_name.trim().is_empty() {
            return Err(Error::InvalidInput("Service name cannot be empty".to_string()));
        }

        let (_write, key) = self.begin_write().await?;

        if self.entries.get(id).await?.is_none() {
            return Err(Error::NotFound(format!("Entry {}", id)));
        }

        let mut entry = VaultEntry::from_new(&fields);
        entry.id = *id;
        self.entries.put(entry.seal(&key)?).await?;

        debug!(entry = %id, "Entry updated");
        Ok(())
    }

    pub async fn delete_entry(&self, id: &EntryId) -> Result<()> {
        let (_write, _key) = self.begin_write().await?;

        self.entries.delete(id).await?;
        debug!(entry = %id, "Entry deleted");
        Ok(())
    }

    /// Decrypt one entry.
    ///
    /// # Errors
    /// - `NotFound` if no such entry
    /// - `AuthenticationFailure` if it does not decrypt under the live key
    pub async fn get_entry(&self, id: &EntryId) -> Result<VaultEntry> {
        let key = self.snapshot_key().await?;
        let stored = self
            .entries
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Entry {}", id)))?;
        VaultEntry::open(&stored, &key)
    }

    /// Decrypt all entries, newest first.
    ///
    /// Entries that fail to decrypt are left out and reported by id.
    pub async fn list_entries(&self) -> Result<EntryListing> {
        let key = self.snapshot_key().await?;
        let mut listing = EntryListing::default();

        for stored in self.entries.list().await? {
            match VaultEntry::open(&stored, &key) {
                Ok(entry) => listing.entries.push(entry),
                Err(e) => {
                    warn!(entry = %stored.id, error = %e, "Skipping entry that failed to decrypt");
                    listing.unreadable.push(stored.id);
                }
            }
        }
        Ok(listing)
    }
}
