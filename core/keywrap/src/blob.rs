//! Wrapped vault key blob.

use std::fmt;

use nanovault_common::{Error, Result};

/// IV length used by hardware AES-GCM style wrap keys.
pub const IV_SIZE: usize = 12;

/// The vault key encrypted under the hardware wrap key.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKeyBlob {
    pub iv: [u8; IV_SIZE],
    pub ciphertext: Vec<u8>,
}

impl WrappedKeyBlob {
    /// Concatenate `iv || ciphertext` for persistence.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a persisted blob.
    ///
    /// # Errors
    /// - Returns `MalformedInput` if there is no ciphertext after the IV
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= IV_SIZE {
            return Err(Error::MalformedInput(format!(
                "Wrapped key blob too short: {} bytes",
                bytes.len()
            )));
        }
        let (iv_bytes, ciphertext) = bytes.split_at(IV_SIZE);
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(iv_bytes);
        Ok(Self {
            iv,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

impl fmt::Debug for WrappedKeyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKeyBlob({} bytes)", IV_SIZE + self.ciphertext.len())
    }
}
