//! Common utilities and types shared across NanoVault crates.
//!
//! This module provides the error taxonomy and a few small value types used
//! by every layer, from the cipher up to the session manager.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EntryId, SensitiveBytes};
