//! Master password records.
//!
//! A [`MasterSecretRecord`] stores the salt, KDF parameters and a verifier
//! digest of the derived key. The verifier lets a candidate password be
//! checked in constant time without storing the key itself and without
//! decrypting any entry.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::kdf::{derive_key, KdfParams};
use crate::keys::{Salt, VaultKey, KEY_LENGTH};
use nanovault_common::{Error, Result};

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

const VERIFIER_DOMAIN: &[u8] = b"nanovault/master-verifier/v1";

/// Persisted reference for master password verification.
///
/// Replaced wholesale on password change; never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterSecretRecord {
    /// Record format version.
    pub version: u32,
    /// Salt for key derivation.
    pub salt: Salt,
    /// KDF parameters used at setup time.
    pub kdf_params: KdfParams,
    /// Digest of the derived key.
    pub verifier: [u8; KEY_LENGTH],
}

impl MasterSecretRecord {
    /// Serialize to bytes for the preference store.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Check, in constant time, whether `key` is the key this record protects.
    pub fn matches_key(&self, key: &VaultKey) -> bool {
        bool::from(verifier_for(key).ct_eq(&self.verifier))
    }
}

fn verifier_for(key: &VaultKey) -> [u8; KEY_LENGTH] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(VERIFIER_DOMAIN);
    hasher.update(key.as_bytes());

    let mut out = [0u8; KEY_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Create a fresh record and the vault key it protects.
///
/// A new random salt is drawn on every call, so two setups with the same
/// password never share a key.
///
/// # Errors
/// - Password empty
/// - Invalid KDF parameters
pub fn setup(password: &[u8], params: &KdfParams) -> Result<(MasterSecretRecord, VaultKey)> {
    let salt = Salt::generate();
    let key = derive_key(password, &salt, params)?;

    let record = MasterSecretRecord {
        version: RECORD_VERSION,
        salt,
        kdf_params: params.clone(),
        verifier: verifier_for(&key),
    };

    Ok((record, key))
}

/// Check a candidate password against a record.
///
/// Returns the derived key on match and `None` otherwise. Derivation errors
/// (empty password, unusable parameters, unknown version) also yield `None`
/// so callers cannot tell a bad record from a bad password.
pub fn verify(password: &[u8], record: &MasterSecretRecord) -> Option<VaultKey> {
    if record.version != RECORD_VERSION {
        return None;
    }

    let candidate = derive_key(password, &record.salt, &record.kdf_params).ok()?;
    let digest = verifier_for(&candidate);

    if bool::from(digest.ct_eq(&record.verifier)) {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::fast_params;

    #[test]
    fn test_setup_then_verify() {
        let (record, key) = setup(b"Tr0ub4dor!", &fast_params()).unwrap();

        let verified = verify(b"Tr0ub4dor!", &record).unwrap();
        assert_eq!(verified, key);
    }

    #[test]
    fn test_wrong_password_returns_none() {
        let (record, _) = setup(b"Tr0ub4dor!", &fast_params()).unwrap();

        assert!(verify(b"wrong", &record).is_none());
        assert!(verify(b"", &record).is_none());
    }

    #[test]
    fn test_setup_uses_fresh_salt() {
        let (r1, k1) = setup(b"same", &fast_params()).unwrap();
        let (r2, k2) = setup(b"same", &fast_params()).unwrap();

        assert_ne!(r1.salt, r2.salt);
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_verifier_is_not_the_key() {
        let (record, key) = setup(b"password", &fast_params()).unwrap();
        assert_ne!(&record.verifier, key.as_bytes());
    }

    #[test]
    fn test_corrupted_record_returns_none() {
        let (mut record, _) = setup(b"password", &fast_params()).unwrap();
        record.verifier[0] ^= 0x01;
        assert!(verify(b"password", &record).is_none());

        let (mut record, _) = setup(b"password", &fast_params()).unwrap();
        record.kdf_params.time_cost = 0;
        assert!(verify(b"password", &record).is_none());

        let (mut record, _) = setup(b"password", &fast_params()).unwrap();
        record.version = 99;
        assert!(verify(b"password", &record).is_none());
    }

    #[test]
    fn test_record_serialization() {
        let (record, _) = setup(b"password", &fast_params()).unwrap();

        let bytes = record.to_bytes().unwrap();
        let restored = MasterSecretRecord::from_bytes(&bytes).unwrap();

        assert_eq!(restored, record);
        assert!(verify(b"password", &restored).is_some());
    }

    #[test]
    fn test_matches_key() {
        let (record, key) = setup(b"password", &fast_params()).unwrap();

        assert!(record.matches_key(&key));
        assert!(!record.matches_key(&VaultKey::generate()));
    }
}
