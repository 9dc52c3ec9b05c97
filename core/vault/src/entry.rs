//! Plaintext entries and their field-level encryption.

use chrono::{DateTime, Utc};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use nanovault_common::{EntryId, Result};
use nanovault_crypto::{decrypt_string, encrypt_string, EncryptedField, VaultKey};
use nanovault_storage::StoredEntry;

/// Fields for a new entry.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct NewEntry {
    pub service_name: String,
    pub username: String,
    pub password: String,
    pub notes: Option<String>,
}

impl fmt::Debug for NewEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewEntry")
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

/// A decrypted credential.
///
/// Secret fields are scrubbed when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct VaultEntry {
    #[zeroize(skip)]
    pub id: EntryId,
    pub service_name: String,
    pub username: String,
    pub password: String,
    pub notes: Option<String>,
    #[zeroize(skip)]
    pub timestamp: DateTime<Utc>,
}

impl VaultEntry {
    /// Build a fresh entry with a new id and the current time.
    ///
    /// Blank notes are dropped rather than encrypted.
    pub fn from_new(new: &NewEntry) -> Self {
        Self {
            id: EntryId::new(),
            service_name: new.service_name.clone(),
            username: new.username.clone(),
            password: new.password.clone(),
            notes: new.notes.clone().filter(|n| !n.trim().is_empty()),
            timestamp: Utc::now(),
        }
    }

    /// Encrypt every sensitive field under `key` with fresh nonces.
    pub fn seal(&self, key: &VaultKey) -> Result<StoredEntry> {
        let k = key.as_bytes();
        Ok(StoredEntry {
            id: self.id,
            service_name: self.service_name.clone(),
            username: seal_field(k, &self.username)?,
            password: seal_field(k, &self.password)?,
            notes: self.notes.as_deref().map(|n| seal_field(k, n)).transpose()?,
            timestamp: self.timestamp,
        })
    }

    /// Decrypt a stored entry. Either every field decrypts or none are returned.
    ///
    /// # Errors
    /// - `AuthenticationFailure` if any field was not sealed under `key`
    /// - `MalformedInput` if a field is not a valid envelope or holds
    ///   non-UTF-8 data
    pub fn open(stored: &StoredEntry, key: &VaultKey) -> Result<Self> {
        let k = key.as_bytes();
        Ok(Self {
            id: stored.id,
            service_name: stored.service_name.clone(),
            username: open_field(k, &stored.username)?,
            password: open_field(k, &stored.password)?,
            notes: stored.notes.as_deref().map(|n| open_field(k, n)).transpose()?,
            timestamp: stored.timestamp,
        })
    }
}

fn seal_field(key: &[u8], plaintext: &str) -> Result<String> {
    Ok(encrypt_string(key, plaintext)?.to_base64())
}

fn open_field(key: &[u8], encoded: &str) -> Result<String> {
    decrypt_string(key, &EncryptedField::from_base64(encoded)?)
}

impl fmt::Debug for VaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultEntry")
            .field("id", &self.id)
            .field("service_name", &self.service_name)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Result of listing entries for display.
#[derive(Debug, Default)]
pub struct EntryListing {
    /// Entries that decrypted, newest first.
    pub entries: Vec<VaultEntry>,
    /// Ids of entries that could not be decrypted and were left out.
    pub unreadable: Vec<EntryId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanovault_common::Error;

    fn sample() -> VaultEntry {
        VaultEntry::from_new(&NewEntry {
            service_name: "example.com".to_string(),
            username: "alice".to_string(),
            password: "p@ss1".to_string(),
            notes: None,
        })
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = VaultKey::generate();
        let entry = sample();

        let stored = entry.seal(&key).unwrap();
        assert_eq!(stored.service_name, "example.com");
        assert!(stored.notes.is_none());

        assert_eq!(VaultEntry::open(&stored, &key).unwrap(), entry);
    }

    #[test]
    fn test_notes_encrypted_when_present() {
        let key = VaultKey::generate();
        let mut entry = sample();
        entry.notes = Some("recovery codes in safe".to_string());

        let stored = entry.seal(&key).unwrap();
        let json = serde_json::to_string(&stored).unwrap();
        assert!(!json.contains("recovery codes"));

        let opened = VaultEntry::open(&stored, &key).unwrap();
        assert_eq!(opened.notes.as_deref(), Some("recovery codes in safe"));
    }

    #[test]
    fn test_blank_notes_are_dropped() {
        for notes in ["", "   \n\t"] {
            let entry = VaultEntry::from_new(&NewEntry {
                service_name: "example.com".to_string(),
                username: "alice".to_string(),
                password: "p@ss1".to_string(),
                notes: Some(notes.to_string()),
            });
            assert_eq!(entry.notes, None);
        }
    }

    #[test]
    fn test_each_seal_uses_fresh_nonces() {
        let key = VaultKey::generate();
        let entry = sample();

        let a = entry.seal(&key).unwrap();
        let b = entry.seal(&key).unwrap();
        assert_ne!(a.username, b.username);
        assert_ne!(a.password, b.password);
        let nonce_of = |f: &str| *EncryptedField::from_base64(f).unwrap().nonce();
        assert_ne!(nonce_of(&a.username), nonce_of(&a.password));
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let stored = sample().seal(&VaultKey::generate()).unwrap();
        assert!(matches!(
            VaultEntry::open(&stored, &VaultKey::generate()),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_open_truncated_field_is_malformed() {
        let key = VaultKey::generate();
        let mut stored = sample().seal(&key).unwrap();
        stored.username = "AAAA".to_string();

        assert!(matches!(
            VaultEntry::open(&stored, &key),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let shown = format!("{:?}", sample());
        assert!(shown.contains("example.com"));
        assert!(!shown.contains("alice"));
        assert!(!shown.contains("p@ss1"));
    }
}
