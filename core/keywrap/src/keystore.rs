//! Hardware keystore trait definition.

use async_trait::async_trait;

use crate::blob::WrappedKeyBlob;
use crate::ceremony::{Authorization, Challenge, WrapPurpose};
use nanovault_common::Result;

/// A secure element holding a non-exportable symmetric wrap key.
///
/// The wrap key can only be used through [`HardwareKeystore::seal`] and
/// [`HardwareKeystore::open`], each of which requires an [`Authorization`]
/// for a challenge issued by [`HardwareKeystore::begin`]. Implementations
/// must not cache an authorization across operations.
#[async_trait]
pub trait HardwareKeystore: Send + Sync {
    /// Get the keystore name (e.g., "software", "secure-enclave").
    fn name(&self) -> &str;

    /// Provision the wrap key if it does not exist yet.
    ///
    /// # Errors
    /// - `HardwareUnavailable` if the device has no secure element
    async fn create_wrap_key(&self) -> Result<()>;

    /// Whether a wrap key is currently provisioned.
    async fn has_wrap_key(&self) -> Result<bool>;

    /// Start an operation and obtain a challenge for the ceremony.
    ///
    /// # Errors
    /// - `NotFound` if no wrap key exists
    async fn begin(&self, purpose: WrapPurpose) -> Result<Challenge>;

    /// Forget a challenge. Discarding a consumed or unknown challenge is a
    /// no-op. Synchronous so it can run from a drop guard.
    fn abort(&self, challenge: &Challenge);

    /// Encrypt `plaintext` under the wrap key.
    ///
    /// # Errors
    /// - `AuthenticationFailed` if the authorization does not match a
    ///   pending `Wrap` challenge
    async fn seal(&self, authorization: Authorization, plaintext: &[u8]) -> Result<WrappedKeyBlob>;

    /// Decrypt a blob under the wrap key.
    ///
    /// # Errors
    /// - `AuthenticationFailed` if the authorization does not match a
    ///   pending `Unwrap` challenge
    /// - `AuthenticationFailure` if the blob does not verify
    async fn open(&self, authorization: Authorization, blob: &WrappedKeyBlob) -> Result<Vec<u8>>;

    /// Delete the wrap key. Deleting a missing key is not an error.
    async fn delete_wrap_key(&self) -> Result<()>;
}
