//! Sync bookkeeping persisted alongside the replica.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State the engine needs across restarts. Stored under its own key so a
/// replica write and a meta write remain independent operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncMeta {
    /// Local edits exist that the remote has not seen yet.
    pub has_local_changes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Modification time the remote store reported after our last upload.
    /// A first sync is one where this has never been recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_remote_modified_time: Option<DateTime<Utc>>,
}

impl SyncMeta {
    /// Whether this replica has ever completed a sync against the remote.
    pub fn has_synced_before(&self) -> bool {
        self.last_sync_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_camel_case_and_sparse() {
        let meta = SyncMeta {
            has_local_changes: true,
            ..SyncMeta::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"hasLocalChanges":true}"#);
    }

    #[test]
    fn missing_fields_default_on_load() {
        let meta: SyncMeta = serde_json::from_str("{}").unwrap();
        assert!(!meta.has_local_changes);
        assert!(!meta.has_synced_before());
    }
}
