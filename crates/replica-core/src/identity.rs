//! Exactly one canonical default-identity person per replica.
//!
//! Both replicas seed themselves with a "Me" row before first sync, so a
//! plain merge would leave two. This pass elects one survivor, physically
//! removes the rest, and rewrites every reference to them.

use crate::clock::is_strictly_newer;
use crate::model::{Person, Record, Replica, DEFAULT_IDENTITY_NAME};
use crate::remap::{apply_remap, RefTarget, RemapTable};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Guarantee a single live default-identity person.
///
/// Synthesizes one if none exists. Among several, the winner is the one
/// carrying the explicit `isSelf` flag, then the strictly newest; first
/// occurrence keeps ties. Returns whether the replica changed.
pub fn enforce_default_identity(replica: &mut Replica, now: DateTime<Utc>) -> bool {
    let candidates: Vec<usize> = replica
        .people
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.deleted && p.is_default_identity())
        .map(|(i, _)| i)
        .collect();

    if candidates.is_empty() {
        debug!("no default identity present, seeding one");
        replica.people.push(Person::default_identity(now));
        return true;
    }

    let winner_index = elect(&replica.people, &candidates);
    let winner_id = replica.people[winner_index].id.clone();

    let mut table = RemapTable::default();
    for &i in &candidates {
        if i != winner_index {
            table.insert(replica.people[i].id.clone(), winner_id.clone());
        }
    }

    let mut changed = false;
    if !table.is_empty() {
        replica
            .people
            .retain(|p| p.id == winner_id || table.resolve(&p.id) == p.id);
        apply_remap(replica, RefTarget::Person, &table, now);
        changed = true;
        debug!(survivor = %winner_id, removed = table.len(), "collapsed duplicate identities");
    }

    // The survivor is reset to canonical shape; contact fields on an
    // identity row are stale artifacts of the name-based matching era.
    if let Some(winner) = replica.people.iter_mut().find(|p| p.id == winner_id) {
        let canonical = winner.name == DEFAULT_IDENTITY_NAME
            && winner.email.is_none()
            && winner.phone.is_none()
            && winner.is_self == Some(true);
        if !canonical {
            winner.name = DEFAULT_IDENTITY_NAME.to_string();
            winner.email = None;
            winner.phone = None;
            winner.is_self = Some(true);
            winner.touch(now);
            changed = true;
        }
    }

    changed
}

/// Prefer an explicitly flagged candidate, then the strictly newest; the
/// earliest index keeps ties.
fn elect(people: &[Person], candidates: &[usize]) -> usize {
    let mut best = candidates[0];
    for &i in &candidates[1..] {
        let challenger = &people[i];
        let incumbent = &people[best];
        let challenger_flagged = challenger.is_self == Some(true);
        let incumbent_flagged = incumbent.is_self == Some(true);
        if challenger_flagged != incumbent_flagged {
            if challenger_flagged {
                best = i;
            }
            continue;
        }
        if is_strictly_newer(challenger.updated_at, incumbent.updated_at) {
            best = i;
        }
    }
    best
}
