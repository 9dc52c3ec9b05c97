//! Authenticated field encryption using ChaCha20-Poly1305.
//!
//! Every call to [`encrypt`] draws a fresh 96-bit nonce from the OS CSPRNG,
//! so independent fields may be encrypted concurrently under the same key
//! without coordinating a counter.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::keys::KEY_LENGTH;
use nanovault_common::{Error, Result};

/// Nonce size for ChaCha20-Poly1305 (12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// One encrypted value: nonce plus ciphertext-with-tag.
///
/// Persisted as a single base64 string of `nonce || ciphertext`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedField {
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// Assemble a field from its parts.
    ///
    /// # Errors
    /// - Returns `MalformedInput` if the ciphertext cannot hold a tag
    pub fn from_parts(nonce: [u8; NONCE_SIZE], ciphertext: Vec<u8>) -> Result<Self> {
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::MalformedInput("Ciphertext too short".to_string()));
        }
        Ok(Self { nonce, ciphertext })
    }

    /// The nonce used for this field.
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// Ciphertext including the trailing tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Concatenate `nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a raw `nonce || ciphertext` blob.
    ///
    /// # Errors
    /// - Returns `MalformedInput` if the blob is shorter than NONCE_SIZE + TAG_SIZE
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::MalformedInput(format!(
                "Envelope too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Encode as standard base64 without line breaks.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Decode from base64.
    ///
    /// # Errors
    /// - Returns `MalformedInput` on invalid base64 or a truncated envelope
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| Error::MalformedInput(format!("Invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedField({} bytes)", NONCE_SIZE + self.ciphertext.len())
    }
}

impl Serialize for EncryptedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for EncryptedField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(de::Error::custom)
    }
}

fn cipher_for(key: &[u8]) -> Result<ChaCha20Poly1305> {
    if key.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        )));
    }
    Ok(ChaCha20Poly1305::new(Key::from_slice(key)))
}

/// Encrypt plaintext using ChaCha20-Poly1305.
///
/// # Preconditions
/// - `key` must be exactly KEY_LENGTH bytes
///
/// # Postconditions
/// - The nonce is freshly drawn from the OS RNG
/// - The ciphertext length is plaintext length + TAG_SIZE
///
/// # Errors
/// - Returns error if key length is incorrect
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<EncryptedField> {
    let cipher = cipher_for(key)?;
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(&nonce);

    Ok(EncryptedField {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a field using ChaCha20-Poly1305.
///
/// # Errors
/// - Returns error if key length is incorrect
/// - Returns `AuthenticationFailure` if the tag does not verify
pub fn decrypt(key: &[u8], field: &EncryptedField) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    cipher
        .decrypt(Nonce::from_slice(&field.nonce), field.ciphertext.as_ref())
        .map_err(|_| Error::AuthenticationFailure)
}

/// Encrypt a UTF-8 string field.
pub fn encrypt_string(key: &[u8], plaintext: &str) -> Result<EncryptedField> {
    encrypt(key, plaintext.as_bytes())
}

/// Decrypt a field that is expected to hold UTF-8 text.
///
/// # Errors
/// - Returns `AuthenticationFailure` if the tag does not verify
/// - Returns `MalformedInput` if the plaintext is not valid UTF-8
pub fn decrypt_string(key: &[u8], field: &EncryptedField) -> Result<String> {
    let plaintext = decrypt(key, field)?;
    String::from_utf8(plaintext).map_err(|e| {
        let mut bytes = e.into_bytes();
        zeroize::Zeroize::zeroize(&mut bytes);
        Error::MalformedInput("Decrypted field is not valid UTF-8".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Hello, World!";

        let field = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &field).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_size() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Test message";

        let field = encrypt(&key, plaintext).unwrap();

        assert_eq!(field.ciphertext().len(), plaintext.len() + TAG_SIZE);
        assert_eq!(field.to_bytes().len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_different_nonce_each_time() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Same plaintext";

        let f1 = encrypt(&key, plaintext).unwrap();
        let f2 = encrypt(&key, plaintext).unwrap();

        assert_ne!(f1.nonce(), f2.nonce());
        assert_ne!(f1.to_base64(), f2.to_base64());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = [1u8; KEY_LENGTH];
        let key2 = [2u8; KEY_LENGTH];

        let field = encrypt(&key1, b"Secret data").unwrap();
        let result = decrypt(&key2, &field);

        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [42u8; KEY_LENGTH];

        let field = encrypt(&key, b"Important data").unwrap();
        let mut bytes = field.to_bytes();
        bytes[NONCE_SIZE + 5] ^= 0xFF;
        let tampered = EncryptedField::from_bytes(&bytes).unwrap();

        assert!(matches!(
            decrypt(&key, &tampered),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let key = [42u8; KEY_LENGTH];

        let field = encrypt(&key, b"Important data").unwrap();
        let mut bytes = field.to_bytes();
        bytes[0] ^= 0x01;
        let tampered = EncryptedField::from_bytes(&bytes).unwrap();

        assert!(matches!(
            decrypt(&key, &tampered),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_short_blob_is_malformed() {
        let short = STANDARD.encode([0u8; NONCE_SIZE - 1]);
        assert!(matches!(
            EncryptedField::from_base64(&short),
            Err(Error::MalformedInput(_))
        ));

        let no_tag = STANDARD.encode([0u8; NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(
            EncryptedField::from_base64(&no_tag),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        assert!(matches!(
            EncryptedField::from_base64("***not base64***"),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key = [0u8; 16];
        assert!(matches!(encrypt(&short_key, b"data"), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [42u8; KEY_LENGTH];

        let field = encrypt(&key, b"").unwrap();
        let encoded = field.to_base64();
        let restored = EncryptedField::from_base64(&encoded).unwrap();

        assert!(decrypt(&key, &restored).unwrap().is_empty());
    }

    #[test]
    fn test_string_helpers() {
        let key = [3u8; KEY_LENGTH];

        let field = encrypt_string(&key, "p@ss1").unwrap();
        assert_eq!(decrypt_string(&key, &field).unwrap(), "p@ss1");

        let binary = encrypt(&key, &[0xFF, 0xFE]).unwrap();
        assert!(matches!(
            decrypt_string(&key, &binary),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_serde_as_base64_string() {
        let key = [5u8; KEY_LENGTH];
        let field = encrypt(&key, b"alice").unwrap();

        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(json, format!("\"{}\"", field.to_base64()));

        let restored: EncryptedField = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, field);

        assert!(serde_json::from_str::<EncryptedField>("\"AAAA\"").is_err());
    }

    #[test]
    fn test_concurrent_encryption_distinct_nonces() {
        let key = [8u8; KEY_LENGTH];
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(move || {
                    (0..64)
                        .map(|_| *encrypt(&key, b"field").unwrap().nonce())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut nonces: Vec<[u8; NONCE_SIZE]> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = nonces.len();
        nonces.sort();
        nonces.dedup();
        assert_eq!(nonces.len(), total);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(key in any::<[u8; KEY_LENGTH]>(), plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let field = encrypt(&key, &plaintext).unwrap();
            let restored = EncryptedField::from_base64(&field.to_base64()).unwrap();
            prop_assert_eq!(decrypt(&key, &restored).unwrap(), plaintext);
        }

        #[test]
        fn prop_wrong_key_never_decrypts(
            k1 in any::<[u8; KEY_LENGTH]>(),
            k2 in any::<[u8; KEY_LENGTH]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 0..128),
        ) {
            prop_assume!(k1 != k2);
            let field = encrypt(&k1, &plaintext).unwrap();
            prop_assert!(matches!(decrypt(&k2, &field), Err(Error::AuthenticationFailure)));
        }
    }
}
