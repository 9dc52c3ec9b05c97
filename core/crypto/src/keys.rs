//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use nanovault_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the master password salt in bytes.
pub const SALT_LENGTH: usize = 16;

/// The symmetric key that protects every entry field.
///
/// Lives only in memory. Copies handed out by the session are independent
/// values and scrub themselves when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; KEY_LENGTH],
}

impl VaultKey {
    /// Create a vault key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a vault key from a byte slice, e.g. the output of an unwrap.
    ///
    /// # Errors
    /// - Returns error if the slice is not exactly KEY_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(Error::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl PartialEq for VaultKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for VaultKey {}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultKey([REDACTED])")
    }
}

/// Salt for master key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(pub [u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_key_generate() {
        let key1 = VaultKey::generate();
        let key2 = VaultKey::generate();

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_vault_key_from_slice() {
        let key = VaultKey::from_slice(&[7u8; KEY_LENGTH]).unwrap();
        assert_eq!(key, VaultKey::from_bytes([7u8; KEY_LENGTH]));

        assert!(VaultKey::from_slice(&[7u8; 16]).is_err());
    }

    #[test]
    fn test_vault_key_zeroize() {
        let mut key = VaultKey::from_bytes([9u8; KEY_LENGTH]);
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; KEY_LENGTH]);
    }

    #[test]
    fn test_vault_key_debug_redacted() {
        let key = VaultKey::from_bytes([0xAB; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "VaultKey([REDACTED])");
    }

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate();
        let salt2 = Salt::generate();

        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }
}
