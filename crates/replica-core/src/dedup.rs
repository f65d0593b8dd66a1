//! Collapse records that are the same content under different ids.
//!
//! Concurrent creation on two replicas produces honest duplicates: distinct
//! ids, identical content. Collapsing them here keeps repeated merges from
//! multiplying rows. Tombstones are never candidates; their content is
//! historical, not identity.

use crate::clock::is_strictly_newer;
use crate::model::Record;
use crate::remap::RemapTable;
use crate::signature::signature_of;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Collapse signature-equal live records of one collection.
///
/// Returns the surviving records (input order preserved, each winner in the
/// slot of its first appearance) and the table of loser-to-winner id
/// substitutions for reference rewriting.
pub fn dedup_collection<T>(records: &[T]) -> (Vec<T>, RemapTable)
where
    T: Record + Clone + Serialize,
{
    let mut out: Vec<T> = Vec::with_capacity(records.len());
    let mut by_signature: HashMap<String, usize> = HashMap::new();
    let mut table = RemapTable::default();

    for record in records {
        if record.is_deleted() {
            out.push(record.clone());
            continue;
        }
        let Some(signature) = signature_of(record) else {
            out.push(record.clone());
            continue;
        };
        match by_signature.get(&signature) {
            Some(&slot) => {
                // Strictly newer takes over; the incumbent keeps ties.
                let incumbent = &out[slot];
                if is_strictly_newer(record.updated_at(), incumbent.updated_at()) {
                    table.insert(incumbent.id(), record.id());
                    out[slot] = record.clone();
                } else {
                    table.insert(record.id(), incumbent.id());
                }
            }
            None => {
                by_signature.insert(signature, out.len());
                out.push(record.clone());
            }
        }
    }

    if !table.is_empty() {
        debug!(collapsed = table.len(), "deduplicated collection");
    }
    (out, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Person;
    use chrono::{DateTime, TimeDelta, Utc};

    fn t(offset_secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(offset_secs)
    }

    fn person(id: &str, name: &str, at: DateTime<Utc>) -> Person {
        Person {
            id: id.to_string(),
            name: name.to_string(),
            updated_at: at,
            ..Person::default()
        }
    }

    #[test]
    fn distinct_content_passes_through() {
        let input = vec![person("p1", "Alice", t(1)), person("p2", "Bob", t(1))];
        let (out, table) = dedup_collection(&input);
        assert_eq!(out, input);
        assert!(table.is_empty());
    }

    #[test]
    fn newer_duplicate_wins_and_loser_is_mapped() {
        let input = vec![person("p1", "Alice", t(1)), person("p2", "Alice", t(5))];
        let (out, table) = dedup_collection(&input);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "p2");
        assert_eq!(table.resolve("p1"), "p2");
    }

    #[test]
    fn incumbent_keeps_ties_and_older_challengers() {
        let input = vec![
            person("p1", "Alice", t(5)),
            person("p2", "Alice", t(5)),
            person("p3", "Alice", t(2)),
        ];
        let (out, table) = dedup_collection(&input);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "p1");
        assert_eq!(table.resolve("p2"), "p1");
        assert_eq!(table.resolve("p3"), "p1");
    }

    #[test]
    fn losers_of_a_dethroned_winner_resolve_to_the_new_winner() {
        // p2 loses to p1 before p3 dethrones it; p2's mapping must still
        // land on the survivor.
        let input = vec![
            person("p1", "Alice", t(5)),
            person("p2", "Alice", t(1)),
            person("p3", "Alice", t(9)),
        ];
        let (out, table) = dedup_collection(&input);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "p3");
        assert_eq!(table.resolve("p1"), "p3");
        assert_eq!(table.resolve("p2"), "p3");
    }

    #[test]
    fn winner_occupies_first_appearance_slot() {
        let input = vec![
            person("p1", "Alice", t(1)),
            person("p2", "Bob", t(1)),
            person("p3", "Alice", t(9)),
        ];
        let (out, _) = dedup_collection(&input);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "p3", "winner replaces the loser in place");
        assert_eq!(out[1].id, "p2");
    }

    #[test]
    fn tombstones_never_collapse() {
        let mut dead_a = person("p1", "Alice", t(1));
        dead_a.deleted = true;
        let mut dead_b = person("p2", "Alice", t(2));
        dead_b.deleted = true;
        let live = person("p3", "Alice", t(3));

        let (out, table) = dedup_collection(&[dead_a, dead_b, live]);
        assert_eq!(out.len(), 3);
        assert!(table.is_empty());
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![person("p1", "Alice", t(1)), person("p2", "Alice", t(5))];
        let (once, _) = dedup_collection(&input);
        let (twice, table) = dedup_collection(&once);

        assert_eq!(once, twice);
        assert!(table.is_empty());
    }
}
