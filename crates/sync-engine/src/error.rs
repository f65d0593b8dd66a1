use crate::local::LocalError;
use crate::remote::RemoteError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures a sync cycle can surface. Connectivity and authentication are
/// checked up front; everything else maps onto the failing store call.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not signed in to the remote store")]
    Unauthenticated,

    #[error("device is offline")]
    Offline,

    #[error("remote store rejected the request: {0}")]
    RemoteRejected(#[from] RemoteError),

    #[error("remote document is malformed: {0}")]
    Malformed(String),

    #[error("local persistence failed: {0}")]
    Storage(#[from] LocalError),
}
