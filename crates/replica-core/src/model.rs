//! Typed record model for the meeting-notes replica.
//!
//! A replica is one JSON document holding every collection. Field names are
//! camelCase on the wire for compatibility with documents written by earlier
//! clients, and every struct tolerates missing fields via serde defaults so
//! a partially written document still loads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Current document schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Reserved display name for the canonical default-identity person.
///
/// Legacy documents marked the identity row by this name alone, before the
/// explicit `isSelf` flag existed.
pub const DEFAULT_IDENTITY_NAME: &str = "Me";

/// Constant id for the built-in "Standard" template.
pub const STANDARD_TEMPLATE_ID: &str = "tpl_standard";

/// Constant id for the built-in "1:1" template.
pub const ONE_ON_ONE_TEMPLATE_ID: &str = "tpl_one_on_one";

/// Generate a fresh entity id: `{prefix}_{uuid-v4}`.
pub fn uid(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4())
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Anything carrying a last-modified instant.
pub trait Stamped {
    fn updated_at(&self) -> DateTime<Utc>;
}

/// A timestamped, soft-deletable entity with a stable id.
pub trait Record: Stamped {
    fn id(&self) -> &str;
    fn is_deleted(&self) -> bool;
    fn set_deleted(&mut self, deleted: bool);
    /// Refresh the last-modified instant.
    fn touch(&mut self, at: DateTime<Utc>);
}

macro_rules! impl_record {
    ($ty:ty) => {
        impl Stamped for $ty {
            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }
        }

        impl Record for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn is_deleted(&self) -> bool {
                self.deleted
            }

            fn set_deleted(&mut self, deleted: bool) {
                self.deleted = deleted;
            }

            fn touch(&mut self, at: DateTime<Utc>) {
                self.updated_at = at;
            }
        }
    };
}

/// A person referenced by items, groups, and 1:1 meetings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Person {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Canonical default-identity marker. At most one live person carries it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_self: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl_record!(Person);

impl Person {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uid("person"),
            name: name.into(),
            created_at: Some(now),
            updated_at: now,
            ..Self::default()
        }
    }

    /// Synthesize the canonical default-identity person.
    pub fn default_identity(now: DateTime<Utc>) -> Self {
        Self {
            is_self: Some(true),
            ..Self::new(DEFAULT_IDENTITY_NAME, now)
        }
    }

    /// Whether this person matches the default-identity criteria.
    pub fn is_default_identity(&self) -> bool {
        self.is_self == Some(true) || self.name == DEFAULT_IDENTITY_NAME
    }
}

/// A named set of people, used to expand update targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub member_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl_record!(Group);

impl Group {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uid("group"),
            name: name.into(),
            created_at: Some(now),
            updated_at: now,
            ..Self::default()
        }
    }
}

/// A long-running subject that meetings and items attach to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl_record!(Project);

impl Project {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uid("project"),
            name: name.into(),
            created_at: Some(now),
            updated_at: now,
            ..Self::default()
        }
    }
}

/// One section of a meeting template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionDef {
    pub key: String,
    pub label: String,
    pub requires: Vec<String>,
}

impl SectionDef {
    pub fn new(key: &str, label: &str, requires: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            requires: requires.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// A meeting layout: which sections exist and what each one requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub sections: Vec<SectionDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl_record!(Template);

/// The built-in templates every replica is expected to carry, in their
/// canonical shapes. Matched by name during normalization because documents
/// written before the constant ids existed used random ids.
pub fn builtin_templates(now: DateTime<Utc>) -> Vec<Template> {
    vec![
        Template {
            id: STANDARD_TEMPLATE_ID.to_string(),
            name: "Standard".to_string(),
            sections: vec![
                SectionDef::new("info", "Information", &[]),
                SectionDef::new("question", "Questions", &[]),
                SectionDef::new("decision", "Decisions", &[]),
                SectionDef::new("action", "Actions", &["ownerId", "status"]),
            ],
            created_at: Some(now),
            updated_at: now,
            deleted: false,
        },
        Template {
            id: ONE_ON_ONE_TEMPLATE_ID.to_string(),
            name: "1:1".to_string(),
            sections: vec![
                SectionDef::new("info", "Notes", &[]),
                SectionDef::new("decision", "Decisions", &[]),
                SectionDef::new("action", "Actions", &["ownerId", "status"]),
                SectionDef::new("question", "Follow-ups", &["updateTargets"]),
            ],
            created_at: Some(now),
            updated_at: now,
            deleted: false,
        },
    ]
}

/// A scheduled meeting instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meeting {
    pub id: String,
    pub template_id: String,
    pub project_id: String,
    pub title: String,
    pub datetime: DateTime<Utc>,
    /// For 1:1s: the person or group this meeting is with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl_record!(Meeting);

/// Workflow status of an action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Open,
    InProgress,
    Blocked,
    Done,
}

/// Per-target record of whether a person has been told about an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateStatus {
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Meeting during which the update was delivered, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
}

/// A note, question, decision, or action captured in a meeting section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Item {
    pub id: String,
    pub meeting_id: String,
    pub project_id: String,
    pub section: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// People who should hear about this item.
    pub update_targets: Vec<String>,
    /// Keys mirror `update_targets` exactly; the normalizer enforces it.
    pub update_status: BTreeMap<String, UpdateStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl_record!(Item);

/// Per-replica settings, merged like any other record but without an id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub default_owner_name: String,
    pub updated_at: DateTime<Utc>,
}

impl Stamped for Settings {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// One side's full dataset: the document that gets merged and synced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Replica {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    pub settings: Settings,
    pub templates: Vec<Template>,
    pub people: Vec<Person>,
    pub groups: Vec<Group>,
    pub projects: Vec<Project>,
    pub meetings: Vec<Meeting>,
    pub items: Vec<Item>,
}

impl Replica {
    /// A freshly seeded replica: built-in templates, the default-identity
    /// person, and nothing else.
    pub fn seeded(now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            updated_at: now,
            settings: Settings {
                default_owner_name: String::new(),
                updated_at: now,
            },
            templates: builtin_templates(now),
            people: vec![Person::default_identity(now)],
            ..Self::default()
        }
    }

    /// Live (non-tombstoned) records of a collection.
    pub fn alive<T: Record>(records: &[T]) -> impl Iterator<Item = &T> {
        records.iter().filter(|r| !r.is_deleted())
    }
}
