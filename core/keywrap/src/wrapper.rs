//! Ceremony-gated wrap and unwrap of the vault key.

use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::blob::WrappedKeyBlob;
use crate::ceremony::{Authenticator, Challenge, WrapPurpose};
use crate::keystore::HardwareKeystore;
use nanovault_common::{Error, Result};
use nanovault_crypto::VaultKey;
use nanovault_storage::{keys, PreferenceStore};

/// Wraps the vault key with a hardware key, one ceremony per operation.
pub struct KeyWrapper {
    keystore: Arc<dyn HardwareKeystore>,
    authenticator: Arc<dyn Authenticator>,
    prefs: Arc<dyn PreferenceStore>,
}

impl KeyWrapper {
    /// Create a wrapper over a keystore, ceremony driver and preference store.
    pub fn new(
        keystore: Arc<dyn HardwareKeystore>,
        authenticator: Arc<dyn Authenticator>,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            keystore,
            authenticator,
            prefs,
        }
    }

    /// Provision the hardware wrap key. Idempotent.
    pub async fn create_wrap_key(&self) -> Result<()> {
        self.keystore.create_wrap_key().await
    }

    /// Run one ceremony for `purpose` and hand the authorization to `op`.
    async fn authorized<T, F, Fut>(&self, purpose: WrapPurpose, op: F) -> Result<T>
    where
        F: FnOnce(crate::ceremony::Authorization) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let pending = PendingChallenge {
            keystore: self.keystore.as_ref(),
            challenge: self.keystore.begin(purpose).await?,
        };

        match self.authenticator.authenticate(&pending.challenge).await {
            Ok(authorization) => op(authorization).await,
            Err(e) => {
                debug!(?purpose, error = %e, "Ceremony did not authorize");
                Err(e)
            }
        }
    }

    /// Encrypt the vault key under the hardware key.
    ///
    /// # Errors
    /// - `HardwareUnavailable`, `AuthenticationCanceled`, `AuthenticationFailed`
    ///   from the ceremony
    pub async fn wrap(&self, vault_key: &VaultKey) -> Result<WrappedKeyBlob> {
        self.keystore.create_wrap_key().await?;
        self.authorized(WrapPurpose::Wrap, |auth| {
            self.keystore.seal(auth, vault_key.as_bytes())
        })
        .await
    }

    /// Recover the vault key from a blob.
    ///
    /// # Errors
    /// - `NotFound` if the wrap key has been deleted
    /// - Ceremony errors as for [`KeyWrapper::wrap`]
    /// - `AuthenticationFailure` if the blob was not sealed by this wrap key
    pub async fn unwrap(&self, blob: &WrappedKeyBlob) -> Result<VaultKey> {
        let plaintext = Zeroizing::new(
            self.authorized(WrapPurpose::Unwrap, |auth| self.keystore.open(auth, blob))
                .await?,
        );
        VaultKey::from_slice(&plaintext)
    }

    /// Wrap the vault key and persist the blob.
    pub async fn enroll(&self, vault_key: &VaultKey) -> Result<()> {
        let blob = self.wrap(vault_key).await?;
        self.prefs.put(keys::WRAPPED_KEY, blob.to_bytes()).await?;
        info!(keystore = self.keystore.name(), "Biometric unlock enrolled");
        Ok(())
    }

    /// Load the persisted blob and unwrap it.
    ///
    /// # Errors
    /// - `NotFound` if nothing is enrolled
    pub async fn unwrap_stored(&self) -> Result<VaultKey> {
        let bytes = self
            .prefs
            .get(keys::WRAPPED_KEY)
            .await?
            .ok_or_else(|| Error::NotFound("No wrapped key enrolled".to_string()))?;
        let blob = WrappedKeyBlob::from_bytes(&bytes)?;
        self.unwrap(&blob).await
    }

    /// Whether a blob is persisted and its wrap key still exists.
    pub async fn is_enrolled(&self) -> Result<bool> {
        Ok(self.prefs.contains(keys::WRAPPED_KEY).await? && self.keystore.has_wrap_key().await?)
    }

    /// Delete the wrap key and the persisted blob.
    ///
    /// The blob is removed even when deleting the wrap key fails, so biometric
    /// unlock is off either way; the keystore error is still returned.
    pub async fn evict(&self) -> Result<()> {
        let deleted = self.keystore.delete_wrap_key().await;
        self.prefs.remove(keys::WRAPPED_KEY).await?;
        if let Err(e) = deleted {
            warn!(error = %e, "Wrapped key removed but wrap key deletion failed");
            return Err(e);
        }
        info!("Biometric unlock evicted");
        Ok(())
    }
}

/// Aborts its challenge when dropped, including when the ceremony future is
/// cancelled mid-flight.
struct PendingChallenge<'a> {
    keystore: &'a dyn HardwareKeystore,
    challenge: Challenge,
}

impl Drop for PendingChallenge<'_> {
    fn drop(&mut self) {
        self.keystore.abort(&self.challenge);
    }
}

/// Whether this device can offer biometric unlock.
pub enum KeyWrapCapability {
    Available(KeyWrapper),
    Unavailable,
}

impl KeyWrapCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, KeyWrapCapability::Available(_))
    }

    /// Borrow the wrapper.
    ///
    /// # Errors
    /// - `HardwareUnavailable` for [`KeyWrapCapability::Unavailable`]
    pub fn wrapper(&self) -> Result<&KeyWrapper> {
        match self {
            KeyWrapCapability::Available(wrapper) => Ok(wrapper),
            KeyWrapCapability::Unavailable => Err(Error::HardwareUnavailable),
        }
    }
}
