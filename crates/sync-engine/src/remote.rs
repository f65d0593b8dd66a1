//! Remote document store abstraction.
//!
//! The engine talks to whatever holds the shared document through this
//! trait: a cloud drive in production, an in-memory store in tests. The
//! document travels as raw JSON so a malformed remote file surfaces as a
//! parse error in the engine rather than a transport failure here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote file not found: {0}")]
    NotFound(String),
    #[error("remote request failed: {0}")]
    Request(String),
}

/// Metadata the store reports for a file, independent of its content.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    /// When the store last saw a write. May be fresher than any stamp
    /// inside the document itself.
    pub modified_time: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Look up a file by name, if it exists.
    async fn find(&self, name: &str) -> Result<Option<RemoteFile>, RemoteError>;

    /// Create an empty file and return its handle.
    async fn create(&self, name: &str) -> Result<RemoteFile, RemoteError>;

    /// Refresh metadata for a known file.
    async fn metadata(&self, file_id: &str) -> Result<RemoteFile, RemoteError>;

    /// Download the file's JSON content.
    async fn download(&self, file_id: &str) -> Result<Value, RemoteError>;

    /// Replace the file's content.
    async fn upload(&self, file_id: &str, content: &Value) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn find(&self, name: &str) -> Result<Option<RemoteFile>, RemoteError> {
        (**self).find(name).await
    }

    async fn create(&self, name: &str) -> Result<RemoteFile, RemoteError> {
        (**self).create(name).await
    }

    async fn metadata(&self, file_id: &str) -> Result<RemoteFile, RemoteError> {
        (**self).metadata(file_id).await
    }

    async fn download(&self, file_id: &str) -> Result<Value, RemoteError> {
        (**self).download(file_id).await
    }

    async fn upload(&self, file_id: &str, content: &Value) -> Result<(), RemoteError> {
        (**self).upload(file_id, content).await
    }
}

#[derive(Debug)]
struct StoredFile {
    name: String,
    content: Value,
    modified_time: Option<DateTime<Utc>>,
}

/// In-memory remote store for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    files: RwLock<HashMap<String, StoredFile>>,
    next_id: RwLock<u64>,
    fail_uploads: AtomicBool,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upload fail, for testing failure handling.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Override a file's modification time, emulating a store whose
    /// metadata outruns the document stamp.
    pub fn set_modified_time(&self, file_id: &str, at: DateTime<Utc>) {
        if let Ok(mut files) = self.files.write() {
            if let Some(file) = files.get_mut(file_id) {
                file.modified_time = Some(at);
            }
        }
    }

    fn lock_poisoned() -> RemoteError {
        RemoteError::Request("store lock poisoned".to_string())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn find(&self, name: &str) -> Result<Option<RemoteFile>, RemoteError> {
        let files = self.files.read().map_err(|_| Self::lock_poisoned())?;
        Ok(files.iter().find(|(_, f)| f.name == name).map(|(id, f)| {
            RemoteFile {
                id: id.clone(),
                name: f.name.clone(),
                modified_time: f.modified_time,
            }
        }))
    }

    async fn create(&self, name: &str) -> Result<RemoteFile, RemoteError> {
        let mut next = self.next_id.write().map_err(|_| Self::lock_poisoned())?;
        *next += 1;
        let id = format!("file_{next}");
        drop(next);

        let mut files = self.files.write().map_err(|_| Self::lock_poisoned())?;
        files.insert(
            id.clone(),
            StoredFile {
                name: name.to_string(),
                content: Value::Null,
                modified_time: None,
            },
        );
        Ok(RemoteFile {
            id,
            name: name.to_string(),
            modified_time: None,
        })
    }

    async fn metadata(&self, file_id: &str) -> Result<RemoteFile, RemoteError> {
        let files = self.files.read().map_err(|_| Self::lock_poisoned())?;
        let file = files
            .get(file_id)
            .ok_or_else(|| RemoteError::NotFound(file_id.to_string()))?;
        Ok(RemoteFile {
            id: file_id.to_string(),
            name: file.name.clone(),
            modified_time: file.modified_time,
        })
    }

    async fn download(&self, file_id: &str) -> Result<Value, RemoteError> {
        let files = self.files.read().map_err(|_| Self::lock_poisoned())?;
        let file = files
            .get(file_id)
            .ok_or_else(|| RemoteError::NotFound(file_id.to_string()))?;
        Ok(file.content.clone())
    }

    async fn upload(&self, file_id: &str, content: &Value) -> Result<(), RemoteError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(RemoteError::Request("simulated upload failure".to_string()));
        }
        let mut files = self.files.write().map_err(|_| Self::lock_poisoned())?;
        let file = files
            .get_mut(file_id)
            .ok_or_else(|| RemoteError::NotFound(file_id.to_string()))?;
        file.content = content.clone();
        file.modified_time = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let remote = InMemoryRemote::new();
        assert!(remote.find("doc.json").await.unwrap().is_none());

        let created = remote.create("doc.json").await.unwrap();
        let found = remote.find("doc.json").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn upload_updates_content_and_modified_time() {
        let remote = InMemoryRemote::new();
        let file = remote.create("doc.json").await.unwrap();

        remote.upload(&file.id, &json!({"v": 1})).await.unwrap();
        assert_eq!(remote.download(&file.id).await.unwrap(), json!({"v": 1}));
        assert!(remote.metadata(&file.id).await.unwrap().modified_time.is_some());
    }

    #[tokio::test]
    async fn failed_uploads_leave_content_untouched() {
        let remote = InMemoryRemote::new();
        let file = remote.create("doc.json").await.unwrap();
        remote.upload(&file.id, &json!({"v": 1})).await.unwrap();

        remote.set_fail_uploads(true);
        assert!(remote.upload(&file.id, &json!({"v": 2})).await.is_err());
        assert_eq!(remote.download(&file.id).await.unwrap(), json!({"v": 1}));
    }
}
