//! Storage interfaces for NanoVault.
//!
//! The vault core never talks to a database directly. It consumes two small
//! async traits:
//! - [`EntryStore`] for encrypted credential rows, keyed by entry id
//! - [`PreferenceStore`] for the master password record and the wrapped key blob
//!
//! # Design Principles
//! - Stores only ever see ciphertext for sensitive fields
//! - Async operations: all I/O operations are async
//! - Atomic batch commit is an opt-in capability of the implementation

pub mod entry;
pub mod local;
pub mod memory;
pub mod store;

pub use entry::StoredEntry;
pub use local::{LocalEntryStore, LocalPreferenceStore};
pub use memory::{MemoryEntryStore, MemoryPreferenceStore};
pub use store::{keys, EntryStore, PreferenceStore};
