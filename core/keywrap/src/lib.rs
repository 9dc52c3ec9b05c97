//! Hardware-gated wrapping of the vault key for biometric unlock.
//!
//! This module provides:
//! - The [`HardwareKeystore`] and [`Authenticator`] seams for the platform
//!   secure element and biometric ceremony
//! - [`KeyWrapper`], which runs one fresh ceremony per wrap or unwrap
//! - [`KeyWrapCapability`], so devices without hardware support are a
//!   normal configuration rather than an error path
//! - [`SoftwareKeystore`] and [`ScriptedAuthenticator`] for tests and demos
//!
//! # Security Guarantees
//! - The master password never reaches this module
//! - Every seal/open consumes an [`Authorization`] bound to a single
//!   keystore challenge; a past authentication cannot be replayed

pub mod blob;
pub mod ceremony;
pub mod keystore;
pub mod software;
pub mod wrapper;

pub use blob::WrappedKeyBlob;
pub use ceremony::{Authenticator, Authorization, CeremonyOutcome, Challenge, ScriptedAuthenticator, WrapPurpose};
pub use keystore::HardwareKeystore;
pub use software::SoftwareKeystore;
pub use wrapper::{KeyWrapCapability, KeyWrapper};
