//! Async sync orchestration over the replica-core merge pipeline.
//!
//! [`SyncEngine`] owns a replica, a remote document store, and a local
//! persistence layer, and reconciles them one cycle at a time. Stores are
//! traits so production backends and test doubles plug in identically.

pub mod engine;
pub mod error;
pub mod local;
pub mod meta;
pub mod remote;
pub mod scheduler;

pub use engine::{SyncConfig, SyncEngine, SyncOutcome, SyncPhase, SyncStatus, TriggerMode};
pub use error::{Result, SyncError};
pub use local::{InMemoryLocal, LocalStore};
pub use meta::SyncMeta;
pub use remote::{InMemoryRemote, RemoteStore};
pub use scheduler::SyncScheduler;
