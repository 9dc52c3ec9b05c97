//! Biometric ceremony types.
//!
//! A keystore operation starts by issuing a [`Challenge`]. The platform
//! authenticator runs the user-facing ceremony for that challenge and, on
//! success, hands back an [`Authorization`] that the keystore consumes by
//! value. The keystore forgets the challenge when it is consumed, so an
//! authorization only ever unlocks the one operation it was issued for.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

use nanovault_common::{Error, Result};

/// What a keystore operation is going to do with the wrap key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapPurpose {
    Wrap,
    Unwrap,
}

/// A pending keystore operation awaiting user authentication.
#[derive(Debug, PartialEq, Eq)]
pub struct Challenge {
    id: u64,
    purpose: WrapPurpose,
}

impl Challenge {
    /// Create a challenge. Called by keystore implementations.
    pub fn new(id: u64, purpose: WrapPurpose) -> Self {
        Self { id, purpose }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn purpose(&self) -> WrapPurpose {
        self.purpose
    }
}

/// Proof that the user authenticated for one specific challenge.
///
/// Deliberately neither `Clone` nor `Copy`.
#[derive(Debug)]
pub struct Authorization {
    challenge_id: u64,
    purpose: WrapPurpose,
}

impl Authorization {
    /// Grant authorization for a challenge. Called by authenticators after a
    /// successful ceremony.
    pub fn grant(challenge: &Challenge) -> Self {
        Self {
            challenge_id: challenge.id,
            purpose: challenge.purpose,
        }
    }

    pub fn challenge_id(&self) -> u64 {
        self.challenge_id
    }

    pub fn purpose(&self) -> WrapPurpose {
        self.purpose
    }
}

/// Platform biometric (or equivalent) ceremony.
///
/// Implementations suspend until the user acts. They must map a user
/// cancel to `AuthenticationCanceled`, a mismatch to `AuthenticationFailed`,
/// and a missing sensor or enrollment to `HardwareUnavailable`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, challenge: &Challenge) -> Result<Authorization>;
}

/// Scripted ceremony result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyOutcome {
    Success,
    Cancel,
    Fail,
    Unavailable,
}

/// Authenticator that replays queued outcomes.
///
/// When the queue is empty the ceremony reports `AuthenticationCanceled`,
/// as if the user dismissed the prompt.
pub struct ScriptedAuthenticator {
    outcomes: Mutex<VecDeque<CeremonyOutcome>>,
    ceremonies: Mutex<usize>,
}

impl ScriptedAuthenticator {
    /// Create with an empty script.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            ceremonies: Mutex::new(0),
        }
    }

    /// Create with the given outcomes.
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = CeremonyOutcome>) -> Self {
        let auth = Self::new();
        for outcome in outcomes {
            auth.push(outcome);
        }
        auth
    }

    /// Queue an outcome for the next ceremony.
    pub fn push(&self, outcome: CeremonyOutcome) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(outcome);
        }
    }

    /// Number of ceremonies run so far.
    pub fn ceremonies(&self) -> usize {
        self.ceremonies.lock().map(|c| *c).unwrap_or(0)
    }
}

impl Default for ScriptedAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn authenticate(&self, challenge: &Challenge) -> Result<Authorization> {
        if let Ok(mut count) = self.ceremonies.lock() {
            *count += 1;
        }

        let outcome = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(CeremonyOutcome::Cancel);

        debug!(purpose = ?challenge.purpose(), ?outcome, "Scripted ceremony");

        match outcome {
            CeremonyOutcome::Success => Ok(Authorization::grant(challenge)),
            CeremonyOutcome::Cancel => Err(Error::AuthenticationCanceled),
            CeremonyOutcome::Fail => Err(Error::AuthenticationFailed),
            CeremonyOutcome::Unavailable => Err(Error::HardwareUnavailable),
        }
    }
}
