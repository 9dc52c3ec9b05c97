//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::reencrypt::ReencryptPolicy;
use nanovault_common::{Error, Result};
use nanovault_crypto::KdfParams;

/// Configuration file name in the vault directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Tunables for a vault session.
///
/// Missing fields fall back to their defaults when deserializing, so a
/// config file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lock after this many seconds without `touch()`.
    pub idle_timeout_secs: u64,
    /// How often the idle monitor checks.
    pub idle_poll_interval_secs: u64,
    /// Go straight to `Unlocked` after first setup.
    pub unlock_after_setup: bool,
    /// KDF parameters for new master password records.
    pub kdf: KdfParams,
    /// What to do with entries that fail to decrypt during re-encryption.
    pub reencrypt_policy: ReencryptPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 15,
            idle_poll_interval_secs: 3,
            unlock_after_setup: false,
            kdf: KdfParams::default(),
            reencrypt_policy: ReencryptPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_interval_secs)
    }

    /// Check that the timing values make sense.
    ///
    /// # Errors
    /// - Zero timeout or poll interval
    /// - Poll interval longer than the timeout
    /// - KDF parameters Argon2 rejects
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(Error::InvalidInput("idle_timeout_secs must be positive".to_string()));
        }
        if self.idle_poll_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "idle_poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.idle_poll_interval_secs > self.idle_timeout_secs {
            return Err(Error::InvalidInput(
                "idle_poll_interval_secs cannot exceed idle_timeout_secs".to_string(),
            ));
        }
        self.kdf.validate()
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.json` from a vault directory, or defaults if absent.
    pub fn load_or_default(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(CONFIG_FILENAME);
        match std::fs::read_to_string(&path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.idle_timeout(), Duration::from_secs(15));
        assert_eq!(config.idle_poll_interval(), Duration::from_secs(3));
        assert!(!config.unlock_after_setup);
        assert_eq!(config.reencrypt_policy, ReencryptPolicy::AbortOnError);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json(r#"{ "idle_timeout_secs": 60 }"#).unwrap();
        assert_eq!(config.idle_timeout_secs, 60);
        assert_eq!(config.idle_poll_interval_secs, 3);
        assert_eq!(config.kdf, KdfParams::moderate());
    }

    #[test]
    fn test_invalid_timing_rejected() {
        assert!(SessionConfig::from_json(r#"{ "idle_timeout_secs": 0 }"#).is_err());
        assert!(SessionConfig::from_json(
            r#"{ "idle_timeout_secs": 5, "idle_poll_interval_secs": 10 }"#
        )
        .is_err());
        assert!(SessionConfig::from_json(
            r#"{ "kdf": { "memory_cost": 1, "time_cost": 0, "parallelism": 1 } }"#
        )
        .is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = SessionConfig {
            unlock_after_setup: true,
            reencrypt_policy: ReencryptPolicy::SkipAndReport,
            ..SessionConfig::default()
        };

        let json = config.to_json().unwrap();
        assert!(json.contains("skip_and_report"));
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_load_or_default() {
        let temp = tempfile::TempDir::new().unwrap();
        assert_eq!(
            SessionConfig::load_or_default(temp.path()).unwrap(),
            SessionConfig::default()
        );

        std::fs::write(
            temp.path().join(CONFIG_FILENAME),
            r#"{ "unlock_after_setup": true }"#,
        )
        .unwrap();
        assert!(SessionConfig::load_or_default(temp.path()).unwrap().unlock_after_setup);
    }
}
