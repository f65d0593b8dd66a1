//! Post-merge normalization pipeline.
//!
//! Runs after every merge and after loading an unfamiliar document, so the
//! invariants hold no matter what state the inputs were in:
//! 1. signature dedup per collection, references rewritten after each
//! 2. exactly one default-identity person
//! 3. built-in templates present under their constant ids
//! 4. live items' target lists and status maps kept consistent

use crate::dedup::dedup_collection;
use crate::identity::enforce_default_identity;
use crate::model::{builtin_templates, Record, Replica, Template, UpdateStatus};
use crate::remap::{apply_remap, RefTarget, RemapTable};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Run the full pipeline. Returns whether the replica changed.
pub fn run(replica: &mut Replica, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    changed |= dedup_all(replica, now);
    changed |= enforce_default_identity(replica, now);
    changed |= normalize_builtin_templates(replica, now);
    changed |= normalize_items(replica, now);

    changed
}

fn dedup_all(replica: &mut Replica, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    let (people, table) = dedup_collection(&replica.people);
    changed |= !table.is_empty();
    replica.people = people;
    apply_remap(replica, RefTarget::Person, &table, now);

    let (groups, table) = dedup_collection(&replica.groups);
    changed |= !table.is_empty();
    replica.groups = groups;
    apply_remap(replica, RefTarget::Group, &table, now);

    let (projects, table) = dedup_collection(&replica.projects);
    changed |= !table.is_empty();
    replica.projects = projects;
    apply_remap(replica, RefTarget::Project, &table, now);

    let (meetings, table) = dedup_collection(&replica.meetings);
    changed |= !table.is_empty();
    replica.meetings = meetings;
    apply_remap(replica, RefTarget::Meeting, &table, now);

    // Templates are reconciled by name below, not by signature: the
    // built-in pair should collapse even when their sections diverged.
    let (items, table) = dedup_collection(&replica.items);
    changed |= !table.is_empty();
    replica.items = items;

    changed
}

/// Ensure each built-in template exists exactly once, under its constant id.
///
/// Documents written before the constant ids existed carry random ids, and
/// two replicas may each have synthesized their own copy. Matching is by
/// name; the constant-id holder wins, otherwise the strictly newest copy.
pub fn normalize_builtin_templates(replica: &mut Replica, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    let mut table = RemapTable::default();

    for canonical in builtin_templates(now) {
        let matches: Vec<usize> = replica
            .templates
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.deleted && t.name == canonical.name)
            .map(|(i, _)| i)
            .collect();

        let tombstoned_holder = replica
            .templates
            .iter()
            .any(|t| t.deleted && t.id == canonical.id);

        if matches.is_empty() {
            // A tombstone on the constant id means the built-in was
            // deliberately deleted; reseeding would duplicate the id and
            // undo the deletion on every pass.
            if tombstoned_holder {
                continue;
            }
            debug!(name = %canonical.name, "built-in template missing, seeding");
            replica.templates.push(canonical);
            changed = true;
            continue;
        }

        let winner_index = elect_template(&replica.templates, &matches, &canonical.id);
        let winner_id = replica.templates[winner_index].id.clone();

        let loser_ids: Vec<String> = matches
            .iter()
            .filter(|&&i| i != winner_index)
            .map(|&i| replica.templates[i].id.clone())
            .collect();
        for loser in &loser_ids {
            table.insert(loser.clone(), canonical.id.clone());
        }
        if !loser_ids.is_empty() {
            replica.templates.retain(|t| !loser_ids.contains(&t.id));
            changed = true;
        }

        // A live copy is about to take the constant id over; drop the
        // tombstone so the id stays unique within the collection.
        if winner_id != canonical.id && tombstoned_holder {
            replica
                .templates
                .retain(|t| !(t.deleted && t.id == canonical.id));
            changed = true;
        }

        let winner = replica
            .templates
            .iter_mut()
            .find(|t| t.id == winner_id)
            .filter(|t| !t.deleted);
        if let Some(winner) = winner {
            let mut touched = false;
            if winner.id != canonical.id {
                table.insert(winner.id.clone(), canonical.id.clone());
                winner.id = canonical.id.clone();
                touched = true;
            }
            if winner.sections.is_empty() {
                winner.sections = canonical.sections.clone();
                touched = true;
            }
            if touched {
                winner.touch(now);
                changed = true;
            }
        }
    }

    apply_remap(replica, RefTarget::Template, &table, now);
    changed
}

fn elect_template(templates: &[Template], matches: &[usize], constant_id: &str) -> usize {
    if let Some(&holder) = matches.iter().find(|&&i| templates[i].id == constant_id) {
        return holder;
    }
    let mut best = matches[0];
    for &i in &matches[1..] {
        if crate::clock::is_strictly_newer(templates[i].updated_at, templates[best].updated_at) {
            best = i;
        }
    }
    best
}

/// Keep each live item's target list and status map consistent: targets
/// hold no blanks or duplicates, and status keys mirror targets exactly.
pub fn normalize_items(replica: &mut Replica, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    for item in replica.items.iter_mut().filter(|i| !i.deleted) {
        let before_targets = item.update_targets.clone();
        let mut seen: Vec<String> = Vec::with_capacity(item.update_targets.len());
        item.update_targets.retain(|id| {
            if id.is_empty() || seen.iter().any(|s| s == id) {
                false
            } else {
                seen.push(id.clone());
                true
            }
        });

        let mut touched = item.update_targets != before_targets;
        for target in &item.update_targets {
            if !item.update_status.contains_key(target) {
                item.update_status
                    .insert(target.clone(), UpdateStatus::default());
                touched = true;
            }
        }
        let before_len = item.update_status.len();
        item.update_status
            .retain(|key, _| item.update_targets.contains(key));
        touched |= item.update_status.len() != before_len;

        if touched {
            item.touch(now);
            changed = true;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        uid, Item, Person, SectionDef, ONE_ON_ONE_TEMPLATE_ID, STANDARD_TEMPLATE_ID,
    };
    use chrono::TimeDelta;

    fn t(offset_secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(offset_secs)
    }

    fn custom_template(name: &str, at: DateTime<Utc>) -> Template {
        Template {
            id: uid("template"),
            name: name.to_string(),
            sections: vec![SectionDef::new("info", "Information", &[])],
            updated_at: at,
            ..Template::default()
        }
    }

    #[test]
    fn missing_builtins_are_seeded() {
        let mut replica = Replica::default();
        assert!(normalize_builtin_templates(&mut replica, t(10)));

        let ids: Vec<&str> = replica.templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![STANDARD_TEMPLATE_ID, ONE_ON_ONE_TEMPLATE_ID]);
    }

    #[test]
    fn legacy_random_id_is_rewritten_to_constant() {
        let mut replica = Replica::default();
        let legacy = custom_template("Standard", t(5));
        let legacy_id = legacy.id.clone();
        replica.templates.push(legacy);

        let mut meeting = crate::model::Meeting {
            template_id: legacy_id.clone(),
            updated_at: t(5),
            ..crate::model::Meeting::default()
        };
        meeting.id = uid("meeting");
        replica.meetings.push(meeting);

        assert!(normalize_builtin_templates(&mut replica, t(10)));

        let standard = replica
            .templates
            .iter()
            .find(|t| t.name == "Standard")
            .unwrap();
        assert_eq!(standard.id, STANDARD_TEMPLATE_ID);
        assert_eq!(replica.meetings[0].template_id, STANDARD_TEMPLATE_ID);
    }

    #[test]
    fn duplicate_builtins_collapse_preferring_constant_id_holder() {
        let mut replica = Replica::default();
        replica.templates.push(custom_template("1:1", t(100)));
        let mut constant = custom_template("1:1", t(1));
        constant.id = ONE_ON_ONE_TEMPLATE_ID.to_string();
        replica.templates.push(constant);

        normalize_builtin_templates(&mut replica, t(200));

        let survivors: Vec<&Template> = replica
            .templates
            .iter()
            .filter(|t| t.name == "1:1")
            .collect();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].id, ONE_ON_ONE_TEMPLATE_ID);
        assert_eq!(survivors[0].updated_at, t(1), "holder kept as-is");
    }

    #[test]
    fn empty_sections_backfilled_from_canonical_shape() {
        let mut replica = Replica::default();
        let mut bare = custom_template("Standard", t(5));
        bare.id = STANDARD_TEMPLATE_ID.to_string();
        bare.sections.clear();
        replica.templates.push(bare);

        assert!(normalize_builtin_templates(&mut replica, t(10)));
        assert_eq!(replica.templates[0].sections.len(), 4);
    }

    #[test]
    fn deleted_builtin_is_not_reseeded() {
        let mut replica = Replica::default();
        let mut dead = custom_template("Standard", t(5));
        dead.id = STANDARD_TEMPLATE_ID.to_string();
        dead.deleted = true;
        replica.templates.push(dead);

        normalize_builtin_templates(&mut replica, t(10));

        let holders: Vec<&Template> = replica
            .templates
            .iter()
            .filter(|t| t.id == STANDARD_TEMPLATE_ID)
            .collect();
        assert_eq!(holders.len(), 1);
        assert!(holders[0].deleted, "the deletion is honored, not undone");
        // The other built-in is still seeded.
        assert!(replica.templates.iter().any(|t| t.id == ONE_ON_ONE_TEMPLATE_ID));
    }

    #[test]
    fn live_legacy_copy_takes_over_a_tombstoned_constant_id() {
        let mut replica = Replica::default();
        let mut dead = custom_template("Standard", t(5));
        dead.id = STANDARD_TEMPLATE_ID.to_string();
        dead.deleted = true;
        replica.templates.push(dead);
        replica.templates.push(custom_template("Standard", t(8)));

        normalize_builtin_templates(&mut replica, t(10));

        let holders: Vec<&Template> = replica
            .templates
            .iter()
            .filter(|t| t.id == STANDARD_TEMPLATE_ID)
            .collect();
        assert_eq!(holders.len(), 1, "constant id must stay unique");
        assert!(!holders[0].deleted);
    }

    #[test]
    fn custom_templates_are_left_alone() {
        let mut replica = Replica::default();
        let custom = custom_template("Retro", t(5));
        let custom_id = custom.id.clone();
        replica.templates.push(custom);

        normalize_builtin_templates(&mut replica, t(10));
        assert!(replica.templates.iter().any(|t| t.id == custom_id));
        assert_eq!(replica.templates.len(), 3);
    }

    #[test]
    fn item_targets_drop_blanks_and_duplicates() {
        let mut replica = Replica::default();
        let mut item = Item {
            id: uid("item"),
            updated_at: t(5),
            ..Item::default()
        };
        item.update_targets = vec![
            "p1".to_string(),
            String::new(),
            "p1".to_string(),
            "p2".to_string(),
        ];
        replica.items.push(item);

        assert!(normalize_items(&mut replica, t(10)));
        assert_eq!(replica.items[0].update_targets, vec!["p1", "p2"]);
    }

    #[test]
    fn status_map_mirrors_targets_exactly() {
        let mut replica = Replica::default();
        let mut item = Item {
            id: uid("item"),
            updated_at: t(5),
            ..Item::default()
        };
        item.update_targets = vec!["p1".to_string()];
        item.update_status
            .insert("p_gone".to_string(), UpdateStatus::default());
        replica.items.push(item);

        assert!(normalize_items(&mut replica, t(10)));
        let item = &replica.items[0];
        assert!(item.update_status.contains_key("p1"));
        assert!(!item.update_status.contains_key("p_gone"));
    }

    #[test]
    fn deleted_items_are_not_rewritten() {
        let mut replica = Replica::default();
        let mut item = Item {
            id: uid("item"),
            deleted: true,
            updated_at: t(5),
            ..Item::default()
        };
        item.update_targets = vec![String::new()];
        replica.items.push(item);

        assert!(!normalize_items(&mut replica, t(10)));
        assert_eq!(replica.items[0].updated_at, t(5));
    }

    #[test]
    fn references_survive_a_dethroned_dedup_winner() {
        let mut replica = Replica::default();
        for (id, at) in [("p1", t(5)), ("p2", t(1)), ("p3", t(9))] {
            replica.people.push(Person {
                id: id.to_string(),
                name: "Alice".to_string(),
                updated_at: at,
                ..Person::default()
            });
        }
        let mut item = Item {
            id: uid("item"),
            owner_id: Some("p2".to_string()),
            updated_at: t(5),
            ..Item::default()
        };
        item.update_targets = vec!["p1".to_string()];
        replica.items.push(item);

        run(&mut replica, t(20));

        let owner = replica.items[0].owner_id.as_deref().unwrap();
        assert_eq!(owner, "p3");
        assert!(
            Replica::alive(&replica.people).any(|p| p.id == owner),
            "rewritten references must point at a surviving record"
        );
        assert_eq!(replica.items[0].update_targets, vec!["p3"]);
    }

    #[test]
    fn full_pipeline_is_idempotent() {
        let mut replica = Replica::default();
        replica.people.push(Person::new("Alice", t(1)));
        replica.people.push(Person {
            updated_at: t(2),
            ..Person::new("Alice", t(1))
        });
        let mut item = Item {
            id: uid("item"),
            updated_at: t(3),
            ..Item::default()
        };
        item.update_targets = vec![replica.people[0].id.clone()];
        replica.items.push(item);

        assert!(run(&mut replica, t(10)));
        let snapshot = replica.clone();
        assert!(!run(&mut replica, t(20)));
        assert_eq!(replica, snapshot);
    }
}
