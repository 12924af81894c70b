//! In-memory flag store

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::flags::{FlagResult, FlagStore, FlagStoreError};

/// Flag store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `set` and `remove` fail
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    fn check_writable(&self) -> FlagResult<()> {
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(FlagStoreError::Write("storage is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn get(&self, key: &str) -> FlagResult<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> FlagResult<()> {
        self.check_writable()?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> FlagResult<()> {
        self.check_writable()?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
