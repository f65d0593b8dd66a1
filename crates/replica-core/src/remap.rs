//! Rewriting of cross-record references after ids collapse.
//!
//! Deduplication and singleton enforcement both replace record ids with
//! surviving canonical ids. Every field that stores an id of the affected
//! type must then be rewritten, including ids used as map keys.

use crate::merge::merge_status;
use crate::model::{Record, Replica, UpdateStatus};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Which record type a reference field points at. Reference rewriting is
/// driven by this declaration rather than by guessing from id prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    Person,
    Group,
    Project,
    Template,
    Meeting,
}

/// Loser-id to winner-id substitutions produced by one collapse pass.
#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    map: HashMap<String, String>,
}

impl RemapTable {
    pub fn insert(&mut self, loser: impl Into<String>, winner: impl Into<String>) {
        self.map.insert(loser.into(), winner.into());
    }

    /// Follow the substitution chain to the final surviving id. Chains
    /// arise when a winner is itself dethroned later in the same pass;
    /// entries only ever point away from removed ids, so the walk
    /// terminates.
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        while let Some(next) = self.map.get(current) {
            current = next;
        }
        current
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// A record whose fields may hold ids of other records.
pub trait References {
    /// Rewrite every reference of the given target type through the table.
    /// Returns whether anything changed.
    fn remap_refs(&mut self, target: RefTarget, table: &RemapTable) -> bool;
}

fn remap_one(field: &mut String, table: &RemapTable) -> bool {
    let resolved = table.resolve(field);
    if resolved != field {
        *field = resolved.to_string();
        return true;
    }
    false
}

fn remap_opt(field: &mut Option<String>, table: &RemapTable) -> bool {
    match field {
        Some(id) => remap_one(id, table),
        None => false,
    }
}

/// Rewrite each element, then drop duplicates the rewrite may have created,
/// keeping first occurrences.
fn remap_many(ids: &mut Vec<String>, table: &RemapTable) -> bool {
    let mut changed = false;
    for id in ids.iter_mut() {
        changed |= remap_one(id, table);
    }
    if changed {
        let mut seen: Vec<String> = Vec::with_capacity(ids.len());
        ids.retain(|id| {
            if seen.iter().any(|s| s == id) {
                false
            } else {
                seen.push(id.clone());
                true
            }
        });
    }
    changed
}

/// Re-key a status map. When two keys collapse onto the same winner the
/// entries are reconciled with the same rule the merger uses.
fn remap_keys(statuses: &mut BTreeMap<String, UpdateStatus>, table: &RemapTable) -> bool {
    if statuses.keys().all(|k| table.resolve(k) == k) {
        return false;
    }
    let old = std::mem::take(statuses);
    for (key, entry) in old {
        let resolved = table.resolve(&key).to_string();
        match statuses.get(&resolved) {
            Some(existing) => {
                let merged = merge_status(existing, &entry);
                statuses.insert(resolved, merged);
            }
            None => {
                statuses.insert(resolved, entry);
            }
        }
    }
    true
}

impl References for crate::model::Group {
    fn remap_refs(&mut self, target: RefTarget, table: &RemapTable) -> bool {
        match target {
            RefTarget::Person => remap_many(&mut self.member_ids, table),
            _ => false,
        }
    }
}

impl References for crate::model::Meeting {
    fn remap_refs(&mut self, target: RefTarget, table: &RemapTable) -> bool {
        match target {
            RefTarget::Template => remap_one(&mut self.template_id, table),
            RefTarget::Project => remap_one(&mut self.project_id, table),
            // The counterpart may be a person or a group; the field answers
            // to both target types.
            RefTarget::Person | RefTarget::Group => remap_opt(&mut self.counterpart_id, table),
            RefTarget::Meeting => false,
        }
    }
}

impl References for crate::model::Item {
    fn remap_refs(&mut self, target: RefTarget, table: &RemapTable) -> bool {
        match target {
            RefTarget::Person => {
                let mut changed = remap_opt(&mut self.owner_id, table);
                changed |= remap_many(&mut self.update_targets, table);
                changed |= remap_keys(&mut self.update_status, table);
                changed
            }
            RefTarget::Meeting => {
                let mut changed = remap_one(&mut self.meeting_id, table);
                for entry in self.update_status.values_mut() {
                    changed |= remap_opt(&mut entry.meeting_id, table);
                }
                changed
            }
            RefTarget::Project => remap_one(&mut self.project_id, table),
            RefTarget::Template | RefTarget::Group => false,
        }
    }
}

/// Rewrite every reference of one target type across the whole replica.
/// Records that changed are restamped so the rewrite replicates.
pub fn apply_remap(
    replica: &mut Replica,
    target: RefTarget,
    table: &RemapTable,
    now: DateTime<Utc>,
) -> bool {
    if table.is_empty() {
        return false;
    }
    let mut changed = false;
    for group in &mut replica.groups {
        if group.remap_refs(target, table) {
            group.touch(now);
            changed = true;
        }
    }
    for meeting in &mut replica.meetings {
        if meeting.remap_refs(target, table) {
            meeting.touch(now);
            changed = true;
        }
    }
    for item in &mut replica.items {
        if item.remap_refs(target, table) {
            item.touch(now);
            changed = true;
        }
    }
    if changed {
        debug!(?target, substitutions = table.len(), "remapped references");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Group, Item, Meeting};
    use chrono::TimeDelta;

    fn t(offset_secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(offset_secs)
    }

    fn table(loser: &str, winner: &str) -> RemapTable {
        let mut t = RemapTable::default();
        t.insert(loser, winner);
        t
    }

    #[test]
    fn unmapped_ids_pass_through() {
        let t = table("p_old", "p_new");
        assert_eq!(t.resolve("p_other"), "p_other");
        assert_eq!(t.resolve("p_old"), "p_new");
    }

    #[test]
    fn chained_substitutions_resolve_to_the_final_winner() {
        let mut t = RemapTable::default();
        t.insert("p_first_loser", "p_interim");
        t.insert("p_interim", "p_final");
        assert_eq!(t.resolve("p_first_loser"), "p_final");
        assert_eq!(t.resolve("p_interim"), "p_final");
        assert_eq!(t.resolve("p_final"), "p_final");
    }

    #[test]
    fn member_lists_collapse_duplicates_after_rewrite() {
        let mut group = Group::new("Team", t(0));
        group.member_ids = vec![
            "p_old".to_string(),
            "p_new".to_string(),
            "p_other".to_string(),
        ];

        let changed = group.remap_refs(RefTarget::Person, &table("p_old", "p_new"));
        assert!(changed);
        assert_eq!(group.member_ids, vec!["p_new", "p_other"]);
    }

    #[test]
    fn meeting_counterpart_answers_both_target_types() {
        let mut meeting = Meeting {
            counterpart_id: Some("g_old".to_string()),
            ..Meeting::default()
        };
        assert!(meeting.remap_refs(RefTarget::Group, &table("g_old", "g_new")));
        assert_eq!(meeting.counterpart_id.as_deref(), Some("g_new"));

        meeting.counterpart_id = Some("p_old".to_string());
        assert!(meeting.remap_refs(RefTarget::Person, &table("p_old", "p_new")));
        assert_eq!(meeting.counterpart_id.as_deref(), Some("p_new"));
    }

    #[test]
    fn status_map_keys_rewritten_and_collisions_merged() {
        let mut item = Item::default();
        item.update_status.insert(
            "p_old".to_string(),
            UpdateStatus {
                updated: true,
                updated_at: Some(t(5)),
                meeting_id: None,
            },
        );
        item.update_status.insert(
            "p_new".to_string(),
            UpdateStatus {
                updated: false,
                updated_at: Some(t(9)),
                meeting_id: None,
            },
        );

        assert!(item.remap_refs(RefTarget::Person, &table("p_old", "p_new")));
        assert_eq!(item.update_status.len(), 1);
        // Delivered beats pending regardless of stamps.
        assert!(item.update_status["p_new"].updated);
    }

    #[test]
    fn nested_meeting_refs_in_status_entries_rewritten() {
        let mut item = Item {
            meeting_id: "m_old".to_string(),
            ..Item::default()
        };
        item.update_status.insert(
            "p1".to_string(),
            UpdateStatus {
                updated: true,
                updated_at: Some(t(5)),
                meeting_id: Some("m_old".to_string()),
            },
        );

        assert!(item.remap_refs(RefTarget::Meeting, &table("m_old", "m_new")));
        assert_eq!(item.meeting_id, "m_new");
        assert_eq!(
            item.update_status["p1"].meeting_id.as_deref(),
            Some("m_new")
        );
    }

    #[test]
    fn apply_remap_restamps_only_touched_records() {
        let mut replica = Replica::default();
        let mut touched = Group::new("Team", t(0));
        touched.member_ids = vec!["p_old".to_string()];
        let untouched = Group::new("Other", t(0));
        replica.groups = vec![touched, untouched];

        let changed = apply_remap(&mut replica, RefTarget::Person, &table("p_old", "p_new"), t(50));
        assert!(changed);
        assert_eq!(replica.groups[0].updated_at, t(50));
        assert_eq!(replica.groups[1].updated_at, t(0));
    }

    #[test]
    fn empty_table_is_a_no_op() {
        let mut replica = Replica::default();
        replica.groups.push(Group::new("Team", t(0)));
        assert!(!apply_remap(
            &mut replica,
            RefTarget::Person,
            &RemapTable::default(),
            t(50)
        ));
    }
}
