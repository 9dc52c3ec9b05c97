//! Vault engine for NanoVault.
//!
//! This module provides:
//! - The session lifecycle state machine that owns the live vault key
//! - Per-field encryption of credential entries
//! - Bulk re-encryption for master password changes
//! - Idle-timeout locking
//! - Password strength checks and generation
//!
//! # Architecture
//! The vault module sits between the user interface and the entry and
//! preference stores, handling all encryption/decryption transparently.
//! A [`VaultSession`] is an explicit context object; front ends share it
//! through an `Arc` rather than relying on global state.

pub mod config;
pub mod entry;
pub mod idle;
pub mod reencrypt;
pub mod session;
pub mod strength;

pub use config::SessionConfig;
pub use entry::{EntryListing, NewEntry, VaultEntry};
pub use idle::IdleMonitor;
pub use reencrypt::{reencrypt_all, ReencryptOutcome, ReencryptPolicy};
pub use session::{ChangePasswordOptions, LifecycleState, LockReason, VaultSession};
pub use strength::{check_password_strength, generate_strong_password, StrengthReport};
