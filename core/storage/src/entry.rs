//! Persisted form of a vault entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nanovault_common::EntryId;

/// A credential row as the entry store holds it.
///
/// `service_name`, `id` and `timestamp` are plaintext labels. Every
/// sensitive field is a base64 AEAD envelope kept as an opaque string; the
/// store never parses it, so one damaged field cannot make the rest of the
/// document unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: EntryId,
    pub service_name: String,
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Order entries newest first, breaking ties by id for stable output.
pub(crate) fn sort_newest_first(entries: &mut [StoredEntry]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));
}
