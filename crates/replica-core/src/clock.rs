//! Named tie-break comparators for last-writer-wins decisions.
//!
//! Every timestamp comparison in the merge pipeline goes through one of
//! these so the tie-break direction is stated once and tested once:
//! - LWW base selection favors the first (local) argument on equal stamps.
//! - Initial-snapshot selection keeps the local side on equal stamps.
//!
//! Timestamps are wall-clock instants supplied by the replicas themselves.
//! Clock skew between devices can mis-order edits; that limitation is
//! inherited from the document format and deliberately not compensated for.

use crate::model::Stamped;
use chrono::{DateTime, Utc};

/// Strict LWW comparison: `a` wins only when it is strictly newer than `b`.
pub fn is_strictly_newer(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a > b
}

/// Pick the `(base, donor)` pair for a record merge.
///
/// The base is the side with the strictly newer stamp; equal stamps keep
/// the first (local) argument as base.
pub fn lww_base<'a, T: Stamped>(local: &'a T, remote: &'a T) -> (&'a T, &'a T) {
    if is_strictly_newer(remote.updated_at(), local.updated_at()) {
        (remote, local)
    } else {
        (local, remote)
    }
}

/// First-sync whole-snapshot selection: the remote replica wins only when
/// the newer of its own stamp and the store's reported modification time is
/// strictly newer than the local stamp. Ties keep local.
pub fn remote_wins_initial(
    local: DateTime<Utc>,
    remote: DateTime<Utc>,
    remote_modified: Option<DateTime<Utc>>,
) -> bool {
    let effective = match remote_modified {
        Some(modified) => remote.max(modified),
        None => remote,
    };
    is_strictly_newer(effective, local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    struct Stamp(DateTime<Utc>);

    impl Stamped for Stamp {
        fn updated_at(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn t(offset_secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(offset_secs)
    }

    #[test]
    fn strictly_newer_rejects_equal_stamps() {
        assert!(is_strictly_newer(t(2), t(1)));
        assert!(!is_strictly_newer(t(1), t(1)));
        assert!(!is_strictly_newer(t(1), t(2)));
    }

    #[test]
    fn lww_base_prefers_local_on_tie() {
        let local = Stamp(t(5));
        let remote = Stamp(t(5));
        let (base, donor) = lww_base(&local, &remote);
        assert!(std::ptr::eq(base, &local));
        assert!(std::ptr::eq(donor, &remote));
    }

    #[test]
    fn lww_base_picks_strictly_newer_remote() {
        let local = Stamp(t(5));
        let remote = Stamp(t(6));
        let (base, donor) = lww_base(&local, &remote);
        assert!(std::ptr::eq(base, &remote));
        assert!(std::ptr::eq(donor, &local));
    }

    #[test]
    fn initial_selection_uses_max_of_remote_stamps() {
        // Remote's own stamp is old but the store saw a later write.
        assert!(remote_wins_initial(t(10), t(5), Some(t(11))));
        // Neither remote stamp beats local.
        assert!(!remote_wins_initial(t(10), t(5), Some(t(9))));
        // Missing store metadata falls back to the replica's own stamp.
        assert!(remote_wins_initial(t(10), t(11), None));
    }

    #[test]
    fn initial_selection_tie_keeps_local() {
        assert!(!remote_wins_initial(t(10), t(10), Some(t(10))));
    }
}
