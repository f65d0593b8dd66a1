//! First-sync snapshot selection.
//!
//! Before the first merge there is no shared history, so the engine adopts
//! one whole snapshot instead of merging field by field. The store's own
//! modification metadata can be fresher than the document stamp when the
//! document was uploaded by a client that did not restamp it.

use crate::clock::remote_wins_initial;
use crate::model::Replica;
use chrono::{DateTime, Utc};

/// Which snapshot a first sync should adopt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotChoice {
    Local,
    Remote,
}

/// Compare the local replica against a remote one never merged before.
/// The remote wins only when strictly newer; ties keep local.
pub fn select_initial(
    local: &Replica,
    remote: &Replica,
    remote_modified: Option<DateTime<Utc>>,
) -> SnapshotChoice {
    if remote_wins_initial(local.updated_at, remote.updated_at, remote_modified) {
        SnapshotChoice::Remote
    } else {
        SnapshotChoice::Local
    }
}
