//! Replica reconciliation for the meeting-notes data model.
//!
//! This crate is the pure core: the typed document model, the last-writer-
//! wins merger, duplicate collapsing, reference rewriting, and the
//! normalization pipeline that keeps a replica's invariants intact. It does
//! no I/O; the `sync-engine` crate drives it against real stores.

pub mod clock;
pub mod dedup;
pub mod identity;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod remap;
pub mod signature;
pub mod snapshot;

pub use merge::{merge_record, merge_replica};
pub use model::{Record, Replica, Stamped};
pub use snapshot::{select_initial, SnapshotChoice};
