//! Master password stretching with Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::keys::{Salt, VaultKey, KEY_LENGTH};
use nanovault_common::{Error, Result};

/// Argon2id cost settings.
///
/// Stored inside each master record, so changing the defaults never breaks
/// an existing vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory in KiB.
    pub memory_cost: u32,
    /// Iteration count.
    pub time_cost: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl KdfParams {
    /// 64 MiB, 3 passes, 4 lanes. Desktop-class unlock latency.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 64 * 1024,
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// 256 MiB, 4 passes, 4 lanes. Expect multi-second unlocks.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 256 * 1024,
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// 32 MiB, 3 passes, 2 lanes. Fits phones and small VMs.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32 * 1024,
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Look up a named preset: `interactive`, `moderate` or `sensitive`.
    pub fn from_preset(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "interactive" => Ok(Self::interactive()),
            "moderate" => Ok(Self::moderate()),
            "sensitive" => Ok(Self::sensitive()),
            _ => Err(Error::InvalidInput(format!(
                "Unknown KDF preset '{}': use interactive, moderate, or sensitive",
                name
            ))),
        }
    }

    /// Reject settings Argon2 cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(&self) -> Result<Params> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_LENGTH),
        )
        .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::moderate()
    }
}

/// Stretch a password into a [`VaultKey`] with Argon2id v1.3.
///
/// Same password, salt and parameters always give the same key. The
/// intermediate buffer is wiped before returning.
///
/// # Errors
/// - `InvalidInput` for an empty password
/// - `Crypto` for parameters Argon2 rejects
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<VaultKey> {
    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);

    let mut out = Zeroizing::new([0u8; KEY_LENGTH]);
    argon2
        .hash_password_into(password, salt.as_bytes(), &mut out[..])
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(VaultKey::from_bytes(*out))
}

#[cfg(test)]
pub(crate) fn fast_params() -> KdfParams {
    KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_inputs_same_key() {
        let salt = Salt::from_bytes([7u8; 16]);
        assert_eq!(
            derive_key(b"Tr0ub4dor!", &salt, &fast_params()).unwrap(),
            derive_key(b"Tr0ub4dor!", &salt, &fast_params()).unwrap()
        );
    }

    #[test]
    fn test_salt_and_password_both_matter() {
        let base = derive_key(b"Tr0ub4dor!", &Salt::from_bytes([1u8; 16]), &fast_params()).unwrap();

        let other_salt =
            derive_key(b"Tr0ub4dor!", &Salt::from_bytes([2u8; 16]), &fast_params()).unwrap();
        let other_password =
            derive_key(b"Tr0ub4dor?", &Salt::from_bytes([1u8; 16]), &fast_params()).unwrap();

        assert_ne!(base, other_salt);
        assert_ne!(base, other_password);
    }

    #[test]
    fn test_cost_changes_key() {
        let salt = Salt::from_bytes([3u8; 16]);
        let mut slower = fast_params();
        slower.time_cost = 2;

        assert_ne!(
            derive_key(b"pw", &salt, &fast_params()).unwrap(),
            derive_key(b"pw", &salt, &slower).unwrap()
        );
    }

    #[test]
    fn test_derive_key_empty_password_fails() {
        let salt = Salt::generate();
        assert!(derive_key(b"", &salt, &fast_params()).is_err());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = KdfParams {
            memory_cost: 1,
            time_cost: 0,
            parallelism: 1,
        };
        assert!(matches!(
            derive_key(b"pw", &Salt::generate(), &params),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn test_presets() {
        assert_eq!(KdfParams::from_preset("moderate").unwrap(), KdfParams::moderate());
        assert_eq!(KdfParams::from_preset("Sensitive").unwrap(), KdfParams::sensitive());
        assert!(KdfParams::interactive().validate().is_ok());
        assert_eq!(KdfParams::default(), KdfParams::moderate());
        assert!(KdfParams::from_preset("extreme").is_err());
    }
}
