//! Local key-value persistence for the replica and its sync metadata.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocalError {
    #[error("local write failed: {0}")]
    Write(String),
    #[error("local read failed: {0}")]
    Read(String),
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, LocalError>;
    async fn put(&self, key: &str, value: &Value) -> Result<(), LocalError>;
}

#[async_trait]
impl<T: LocalStore + ?Sized> LocalStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>, LocalError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), LocalError> {
        (**self).put(key, value).await
    }
}

/// In-memory local store for tests.
#[derive(Debug, Default)]
pub struct InMemoryLocal {
    entries: RwLock<HashMap<String, Value>>,
    fail_puts: AtomicBool,
    fail_puts_for: RwLock<Option<String>>,
}

impl InMemoryLocal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent put fail, for testing failure handling.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make puts to one key fail, for testing partial-write handling.
    pub fn set_fail_puts_for(&self, key: Option<&str>) {
        if let Ok(mut fail_key) = self.fail_puts_for.write() {
            *fail_key = key.map(str::to_string);
        }
    }

    fn put_should_fail(&self, key: &str) -> bool {
        if self.fail_puts.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_puts_for
            .read()
            .map(|fail_key| fail_key.as_deref() == Some(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl LocalStore for InMemoryLocal {
    async fn get(&self, key: &str) -> Result<Option<Value>, LocalError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LocalError::Read("store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), LocalError> {
        if self.put_should_fail(key) {
            return Err(LocalError::Write("simulated write failure".to_string()));
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LocalError::Write("store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }
}
