//! Process-local keystore.
//!
//! Holds a random wrap key in memory with no accessor, and enforces the
//! same challenge/authorization rules a hardware keystore does. Useful for
//! testing and for hosts without a secure element that still want to
//! exercise the biometric flow.

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::blob::WrappedKeyBlob;
use crate::ceremony::{Authorization, Challenge, WrapPurpose};
use crate::keystore::HardwareKeystore;
use nanovault_common::{Error, Result};
use nanovault_crypto::aead::{self, EncryptedField};
use nanovault_crypto::VaultKey;

struct Inner {
    wrap_key: Option<VaultKey>,
    pending: HashMap<u64, WrapPurpose>,
}

/// In-memory stand-in for a secure element.
pub struct SoftwareKeystore {
    inner: Mutex<Inner>,
}

impl SoftwareKeystore {
    /// Create a keystore with no wrap key provisioned.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                wrap_key: None,
                pending: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Crypto("Keystore lock poisoned".to_string()))
    }

    /// Consume a pending challenge and return a copy of the wrap key.
    fn redeem(&self, authorization: &Authorization, expected: WrapPurpose) -> Result<VaultKey> {
        let mut inner = self.lock()?;

        let purpose = inner.pending.remove(&authorization.challenge_id());
        if purpose != Some(expected) || authorization.purpose() != expected {
            warn!(
                challenge = authorization.challenge_id(),
                ?expected,
                "Rejected authorization not bound to a pending challenge"
            );
            return Err(Error::AuthenticationFailed);
        }

        inner
            .wrap_key
            .clone()
            .ok_or_else(|| Error::NotFound("Wrap key".to_string()))
    }
}

#[cfg(test)]
impl SoftwareKeystore {
    pub(crate) fn pending_challenges(&self) -> usize {
        self.inner.lock().map(|inner| inner.pending.len()).unwrap_or(0)
    }
}

impl Default for SoftwareKeystore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareKeystore for SoftwareKeystore {
    fn name(&self) -> &str {
        "software"
    }

    async fn create_wrap_key(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.wrap_key.is_none() {
            inner.wrap_key = Some(VaultKey::generate());
            debug!("Provisioned software wrap key");
        }
        Ok(())
    }

    async fn has_wrap_key(&self) -> Result<bool> {
        Ok(self.lock()?.wrap_key.is_some())
    }

    async fn begin(&self, purpose: WrapPurpose) -> Result<Challenge> {
        let mut inner = self.lock()?;
        if inner.wrap_key.is_none() {
            return Err(Error::NotFound("Wrap key".to_string()));
        }

        let mut id = OsRng.next_u64();
        while inner.pending.contains_key(&id) {
            id = OsRng.next_u64();
        }
        inner.pending.insert(id, purpose);

        Ok(Challenge::new(id, purpose))
    }

    fn abort(&self, challenge: &Challenge) {
        if let Ok(mut inner) = self.lock() {
            inner.pending.remove(&challenge.id());
        }
    }

    async fn seal(&self, authorization: Authorization, plaintext: &[u8]) -> Result<WrappedKeyBlob> {
        let wrap_key = self.redeem(&authorization, WrapPurpose::Wrap)?;
        let field = aead::encrypt(wrap_key.as_bytes(), plaintext)?;

        Ok(WrappedKeyBlob {
            iv: *field.nonce(),
            ciphertext: field.ciphertext().to_vec(),
        })
    }

    async fn open(&self, authorization: Authorization, blob: &WrappedKeyBlob) -> Result<Vec<u8>> {
        let wrap_key = self.redeem(&authorization, WrapPurpose::Unwrap)?;
        let field = EncryptedField::from_parts(blob.iv, blob.ciphertext.clone())?;
        aead::decrypt(wrap_key.as_bytes(), &field)
    }

    async fn delete_wrap_key(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.wrap_key = None;
        inner.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seal_open_roundtrip() {
        let ks = SoftwareKeystore::new();
        ks.create_wrap_key().await.unwrap();

        let c = ks.begin(WrapPurpose::Wrap).await.unwrap();
        let blob = ks.seal(Authorization::grant(&c), b"secret key").await.unwrap();

        let c = ks.begin(WrapPurpose::Unwrap).await.unwrap();
        let opened = ks.open(Authorization::grant(&c), &blob).await.unwrap();
        assert_eq!(opened, b"secret key");
    }

    #[tokio::test]
    async fn test_create_wrap_key_idempotent() {
        let ks = SoftwareKeystore::new();
        ks.create_wrap_key().await.unwrap();

        let c = ks.begin(WrapPurpose::Wrap).await.unwrap();
        let blob = ks.seal(Authorization::grant(&c), b"k").await.unwrap();

        ks.create_wrap_key().await.unwrap();

        let c = ks.begin(WrapPurpose::Unwrap).await.unwrap();
        assert_eq!(ks.open(Authorization::grant(&c), &blob).await.unwrap(), b"k");
    }

    #[tokio::test]
    async fn test_authorization_single_use() {
        let ks = SoftwareKeystore::new();
        ks.create_wrap_key().await.unwrap();

        let c = ks.begin(WrapPurpose::Wrap).await.unwrap();
        let first = Authorization::grant(&c);
        let forged_replay = Authorization::grant(&c);

        ks.seal(first, b"k").await.unwrap();
        assert!(matches!(
            ks.seal(forged_replay, b"k").await,
            Err(Error::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn test_purpose_mismatch_rejected() {
        let ks = SoftwareKeystore::new();
        ks.create_wrap_key().await.unwrap();

        let c = ks.begin(WrapPurpose::Unwrap).await.unwrap();
        assert!(matches!(
            ks.seal(Authorization::grant(&c), b"k").await,
            Err(Error::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn test_aborted_challenge_unusable() {
        let ks = SoftwareKeystore::new();
        ks.create_wrap_key().await.unwrap();

        let c = ks.begin(WrapPurpose::Wrap).await.unwrap();
        let auth = Authorization::grant(&c);
        ks.abort(&c);

        assert!(matches!(ks.seal(auth, b"k").await, Err(Error::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_delete_wrap_key() {
        let ks = SoftwareKeystore::new();
        ks.create_wrap_key().await.unwrap();

        let c = ks.begin(WrapPurpose::Wrap).await.unwrap();
        let blob = ks.seal(Authorization::grant(&c), b"k").await.unwrap();

        ks.delete_wrap_key().await.unwrap();
        assert!(!ks.has_wrap_key().await.unwrap());
        assert!(matches!(ks.begin(WrapPurpose::Unwrap).await, Err(Error::NotFound(_))));

        // A re-provisioned key cannot open blobs sealed under the old one.
        ks.create_wrap_key().await.unwrap();
        let c = ks.begin(WrapPurpose::Unwrap).await.unwrap();
        assert!(matches!(
            ks.open(Authorization::grant(&c), &blob).await,
            Err(Error::AuthenticationFailure)
        ));
    }
}
