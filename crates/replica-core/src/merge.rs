//! Last-writer-wins merge of two replicas' records.
//!
//! The merge is field-aware, not whole-record: the strictly newer side
//! becomes the base, the other side backfills fields the base left empty,
//! and a few fields follow their own rules:
//! - update-status entries: `updated: true` beats `false`; agreement is
//!   settled by the entry's own timestamp
//! - update-target arrays grow monotonically (set union)
//! - the tombstone follows whichever side is strictly newer, so a later
//!   edit on one replica resurrects a record deleted earlier on the other

use crate::clock::{is_strictly_newer, lww_base};
use crate::model::{
    Group, Item, Meeting, Person, Project, Record, Replica, Settings, Template, UpdateStatus,
    SCHEMA_VERSION,
};
use crate::normalize;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// A record that knows how to merge with its counterpart from the other
/// replica.
pub trait Merge: Record + Clone {
    /// Fill fields absent on `self` from the donor. Present values always
    /// win; this never overwrites.
    fn absorb(&mut self, donor: &Self);

    /// Field rules that consider both sides in call order, applied after
    /// base selection. Most record types have none.
    fn merge_special(&mut self, _local: &Self, _remote: &Self) {}
}

impl Merge for Person {
    fn absorb(&mut self, donor: &Self) {
        if self.email.is_none() {
            self.email = donor.email.clone();
        }
        if self.phone.is_none() {
            self.phone = donor.phone.clone();
        }
        if self.is_self.is_none() {
            self.is_self = donor.is_self;
        }
        if self.created_at.is_none() {
            self.created_at = donor.created_at;
        }
    }
}

impl Merge for Group {
    fn absorb(&mut self, donor: &Self) {
        if self.created_at.is_none() {
            self.created_at = donor.created_at;
        }
    }

    fn merge_special(&mut self, local: &Self, remote: &Self) {
        // Membership grows monotonically, like update targets.
        self.member_ids = union_ids(&local.member_ids, &remote.member_ids);
    }
}

impl Merge for Project {
    fn absorb(&mut self, donor: &Self) {
        if self.created_at.is_none() {
            self.created_at = donor.created_at;
        }
    }
}

impl Merge for Template {
    fn absorb(&mut self, donor: &Self) {
        if self.sections.is_empty() {
            self.sections = donor.sections.clone();
        }
        if self.created_at.is_none() {
            self.created_at = donor.created_at;
        }
    }
}

impl Merge for Meeting {
    fn absorb(&mut self, donor: &Self) {
        if self.counterpart_id.is_none() {
            self.counterpart_id = donor.counterpart_id.clone();
        }
        if self.created_at.is_none() {
            self.created_at = donor.created_at;
        }
    }
}

impl Merge for Item {
    fn absorb(&mut self, donor: &Self) {
        if self.owner_id.is_none() {
            self.owner_id = donor.owner_id.clone();
        }
        if self.status.is_none() {
            self.status = donor.status;
        }
        if self.due_date.is_none() {
            self.due_date = donor.due_date;
        }
        if self.link.is_none() {
            self.link = donor.link.clone();
        }
        if self.created_at.is_none() {
            self.created_at = donor.created_at;
        }
    }

    fn merge_special(&mut self, local: &Self, remote: &Self) {
        self.update_status = merge_status_maps(&local.update_status, &remote.update_status);
        self.update_targets = union_ids(&local.update_targets, &remote.update_targets);
    }
}

/// Union of id arrays preserving first-argument order, then appending ids
/// only the second side holds.
fn union_ids(a: &[String], b: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(a.len() + b.len());
    for id in a.iter().chain(b.iter()) {
        if !out.iter().any(|existing| existing == id) {
            out.push(id.clone());
        }
    }
    out
}

fn status_stamp(status: &UpdateStatus) -> DateTime<Utc> {
    status.updated_at.unwrap_or_default()
}

/// Reconcile two status entries for the same target person.
///
/// `updated: true` beats `false`. When both sides agree on truthiness, the
/// entry with the strictly newer inner timestamp wins; ties keep the first
/// argument.
pub fn merge_status(a: &UpdateStatus, b: &UpdateStatus) -> UpdateStatus {
    match (a.updated, b.updated) {
        (true, false) => a.clone(),
        (false, true) => b.clone(),
        _ => {
            if is_strictly_newer(status_stamp(b), status_stamp(a)) {
                b.clone()
            } else {
                a.clone()
            }
        }
    }
}

/// Merge two update-status maps entry-wise.
pub fn merge_status_maps(
    local: &BTreeMap<String, UpdateStatus>,
    remote: &BTreeMap<String, UpdateStatus>,
) -> BTreeMap<String, UpdateStatus> {
    let mut out = local.clone();
    for (person_id, remote_entry) in remote {
        match out.get(person_id) {
            Some(local_entry) => {
                let merged = merge_status(local_entry, remote_entry);
                out.insert(person_id.clone(), merged);
            }
            None => {
                out.insert(person_id.clone(), remote_entry.clone());
            }
        }
    }
    out
}

/// Merge both replicas' values for one record id.
///
/// A record present on only one side is taken unmodified. Otherwise the
/// strictly newer side is the base (ties keep local), the other side
/// backfills, and the tombstone follows the base.
pub fn merge_record<T: Merge>(local: Option<&T>, remote: Option<&T>) -> Option<T> {
    match (local, remote) {
        (Some(a), Some(b)) => {
            let (base, donor) = lww_base(a, b);
            let mut merged = base.clone();
            merged.absorb(donor);
            merged.merge_special(a, b);
            // Deletion state is resolved by recency alone, independent of
            // what the donor backfilled. A later live edit resurrects.
            merged.set_deleted(base.is_deleted());
            Some(merged)
        }
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    }
}

/// Merge two collections by id: the output holds every id from either side,
/// each merged per [`merge_record`], live records ordered before tombstones.
pub fn merge_collection<T: Merge>(local: &[T], remote: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(local.len().max(remote.len()));

    for record in local {
        let counterpart = remote.iter().find(|r| r.id() == record.id());
        if let Some(merged) = merge_record(Some(record), counterpart) {
            out.push(merged);
        }
    }
    for record in remote {
        if !local.iter().any(|r| r.id() == record.id()) {
            if let Some(merged) = merge_record(None, Some(record)) {
                out.push(merged);
            }
        }
    }

    out.sort_by_key(|r| r.is_deleted());
    out
}

/// Settings carry no id and no optional fields: plain LWW, local wins ties.
pub fn merge_settings(local: &Settings, remote: &Settings) -> Settings {
    let (base, _) = lww_base(local, remote);
    base.clone()
}

/// Merge every collection of two replicas and re-run the full normalization
/// pipeline, so the result satisfies the invariants even when neither input
/// did.
pub fn merge_replica(local: &Replica, remote: &Replica, now: DateTime<Utc>) -> Replica {
    let mut merged = Replica {
        schema_version: SCHEMA_VERSION,
        updated_at: now,
        settings: merge_settings(&local.settings, &remote.settings),
        templates: merge_collection(&local.templates, &remote.templates),
        people: merge_collection(&local.people, &remote.people),
        groups: merge_collection(&local.groups, &remote.groups),
        projects: merge_collection(&local.projects, &remote.projects),
        meetings: merge_collection(&local.meetings, &remote.meetings),
        items: merge_collection(&local.items, &remote.items),
    };
    let changed = normalize::run(&mut merged, now);
    debug!(normalized = changed, "merged replicas");
    merged
}
