//! The sync orchestrator.
//!
//! Owns the in-memory replica, drives one remote reconciliation cycle at a
//! time, and persists locally only after the remote accepted the merged
//! document. A failed cycle therefore never leaves the local store holding
//! state the remote has not seen.

use crate::error::{Result, SyncError};
use crate::local::LocalStore;
use crate::meta::SyncMeta;
use crate::remote::{RemoteFile, RemoteStore};
use chrono::{DateTime, Utc};
use replica_core::model::Replica;
use replica_core::snapshot::{select_initial, SnapshotChoice};
use replica_core::{merge_replica, normalize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Local-store key holding the replica document.
pub const KEY_REPLICA: &str = "replica";
/// Local-store key holding the sync bookkeeping.
pub const KEY_META: &str = "meta";

/// Default name of the shared document on the remote store. Versioned so a
/// future schema break can move to a fresh file.
pub const DEFAULT_REMOTE_FILE: &str = "meeting-notes.v1.json";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub remote_file_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_file_name: DEFAULT_REMOTE_FILE.to_string(),
        }
    }
}

/// Where the engine currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Syncing,
}

/// Point-in-time view of the engine for callers rendering sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub dirty: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Who asked for this sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// User-initiated. Runs even when nothing changed locally.
    Manual,
    /// Scheduled. Skipped when the replica is clean and has synced before.
    Silent,
}

/// How a sync request ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    /// Another cycle was already running.
    SkippedInFlight,
    /// Silent trigger with nothing to push and nothing new expected.
    SkippedClean,
}

pub struct SyncEngine<R, L> {
    remote: R,
    local: L,
    config: SyncConfig,
    replica: Replica,
    meta: SyncMeta,
    online: bool,
    authenticated: bool,
    in_flight: bool,
}

impl<R: RemoteStore, L: LocalStore> SyncEngine<R, L> {
    pub fn new(remote: R, local: L, config: SyncConfig) -> Self {
        Self {
            remote,
            local,
            config,
            replica: Replica::default(),
            meta: SyncMeta::default(),
            online: true,
            authenticated: false,
            in_flight: false,
        }
    }

    /// Load persisted state, seeding a fresh replica on first run.
    pub async fn load(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.local.get(KEY_REPLICA).await? {
            Some(value) => {
                self.replica = serde_json::from_value(value)
                    .map_err(|e| SyncError::Malformed(e.to_string()))?;
            }
            None => {
                info!("no local replica, seeding a fresh one");
                self.replica = Replica::seeded(now);
                self.persist_replica().await?;
            }
        }
        if let Some(value) = self.local.get(KEY_META).await? {
            self.meta =
                serde_json::from_value(value).map_err(|e| SyncError::Malformed(e.to_string()))?;
        }
        Ok(())
    }

    /// Apply a local edit: mutate, restamp, persist, and mark dirty.
    pub async fn update_replica<F>(&mut self, now: DateTime<Utc>, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Replica),
    {
        mutate(&mut self.replica);
        self.replica.updated_at = now;
        self.persist_replica().await?;
        self.meta.has_local_changes = true;
        self.persist_meta().await?;
        Ok(())
    }

    /// Merge an externally supplied document (a backup file, say) into the
    /// live replica. The result is dirty until the next sync pushes it.
    pub async fn import_replica(&mut self, document: Value, now: DateTime<Utc>) -> Result<()> {
        let imported: Replica =
            serde_json::from_value(document).map_err(|e| SyncError::Malformed(e.to_string()))?;
        self.replica = merge_replica(&self.replica, &imported, now);
        self.persist_replica().await?;
        self.meta.has_local_changes = true;
        self.persist_meta().await?;
        info!("imported external document into replica");
        Ok(())
    }

    /// Run one sync cycle. Re-entrant triggers and clean silent triggers
    /// are no-ops; connectivity and authentication failures are errors the
    /// caller may surface or swallow depending on the trigger.
    pub async fn sync(
        &mut self,
        mode: TriggerMode,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        if self.in_flight {
            debug!(reason, "sync already in flight, skipping");
            return Ok(SyncOutcome::SkippedInFlight);
        }
        if mode == TriggerMode::Silent
            && !self.meta.has_local_changes
            && self.meta.has_synced_before()
        {
            debug!(reason, "replica clean, skipping silent sync");
            return Ok(SyncOutcome::SkippedClean);
        }
        if !self.authenticated {
            return Err(SyncError::Unauthenticated);
        }
        if !self.online {
            return Err(SyncError::Offline);
        }

        self.in_flight = true;
        let result = self.run_cycle(now).await;
        self.in_flight = false;

        match &result {
            Ok(()) => info!(reason, "sync completed"),
            Err(e) => warn!(reason, error = %e, "sync failed"),
        }
        result.map(|()| SyncOutcome::Completed)
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<()> {
        let file = self.ensure_remote_file().await?;
        let raw = self.remote.download(&file.id).await?;
        let remote_replica = parse_remote(raw)?;
        let file = self.remote.metadata(&file.id).await?;

        let mut next = match remote_replica {
            None => {
                debug!("remote document empty, pushing local state");
                let mut next = self.replica.clone();
                normalize::run(&mut next, now);
                next
            }
            Some(remote) if !self.meta.has_synced_before() => {
                let choice = select_initial(&self.replica, &remote, file.modified_time);
                info!(?choice, "first sync, adopting one snapshot whole");
                let mut next = match choice {
                    SnapshotChoice::Local => self.replica.clone(),
                    SnapshotChoice::Remote => remote,
                };
                normalize::run(&mut next, now);
                next
            }
            Some(remote) => merge_replica(&self.replica, &remote, now),
        };
        next.updated_at = now;

        let document =
            serde_json::to_value(&next).map_err(|e| SyncError::Malformed(e.to_string()))?;
        self.remote.upload(&file.id, &document).await?;
        let file = self.remote.metadata(&file.id).await?;

        // The remote has the merged document. Only now is it safe to
        // overwrite local state. Replica before meta: a failed meta write
        // leaves persisted meta merely stale (dirty still set, old sync
        // stamp) and the next cycle rewrites both; meta first could
        // persist a clean flag over a stale replica.
        let next_meta = SyncMeta {
            has_local_changes: false,
            last_sync_at: Some(now),
            last_remote_modified_time: file.modified_time,
        };
        self.local.put(KEY_REPLICA, &document).await?;
        let meta_value =
            serde_json::to_value(&next_meta).map_err(|e| SyncError::Malformed(e.to_string()))?;
        self.local.put(KEY_META, &meta_value).await?;

        self.replica = next;
        self.meta = next_meta;
        Ok(())
    }

    async fn ensure_remote_file(&self) -> Result<RemoteFile> {
        match self.remote.find(&self.config.remote_file_name).await? {
            Some(file) => Ok(file),
            None => {
                info!(name = %self.config.remote_file_name, "remote document missing, creating");
                Ok(self.remote.create(&self.config.remote_file_name).await?)
            }
        }
    }

    async fn persist_replica(&self) -> Result<()> {
        let value = serde_json::to_value(&self.replica)
            .map_err(|e| SyncError::Malformed(e.to_string()))?;
        self.local.put(KEY_REPLICA, &value).await?;
        Ok(())
    }

    async fn persist_meta(&self) -> Result<()> {
        let value =
            serde_json::to_value(&self.meta).map_err(|e| SyncError::Malformed(e.to_string()))?;
        self.local.put(KEY_META, &value).await?;
        Ok(())
    }

    /// Flag the replica as ahead of the remote without going through
    /// [`update_replica`], for callers that mutate state out of band.
    ///
    /// [`update_replica`]: SyncEngine::update_replica
    pub async fn mark_dirty(&mut self) -> Result<()> {
        if !self.meta.has_local_changes {
            self.meta.has_local_changes = true;
            self.persist_meta().await?;
        }
        Ok(())
    }

    pub fn phase(&self) -> SyncPhase {
        if self.in_flight {
            SyncPhase::Syncing
        } else {
            SyncPhase::Idle
        }
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            phase: self.phase(),
            dirty: self.meta.has_local_changes,
            last_sync_at: self.meta.last_sync_at,
        }
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    pub fn is_dirty(&self) -> bool {
        self.meta.has_local_changes
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }
}

/// An empty or null remote file means the document was never written;
/// anything else must parse as a replica.
fn parse_remote(raw: Value) -> Result<Option<Replica>> {
    match raw {
        Value::Null => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(|e| SyncError::Malformed(e.to_string())),
    }
}
