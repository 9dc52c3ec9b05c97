//! Cryptographic primitives for NanoVault.
//!
//! This module provides:
//! - Field envelope encryption using ChaCha20-Poly1305
//! - Master key derivation using Argon2id
//! - Master password records with constant-time verification
//! - Key types with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time operations for sensitive comparisons

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod master;

pub use aead::{decrypt, decrypt_string, encrypt, encrypt_string, EncryptedField};
pub use kdf::{derive_key, KdfParams};
pub use keys::{Salt, VaultKey, KEY_LENGTH};
pub use master::MasterSecretRecord;
