//! File-backed flag store
//!
//! Flags live in a flat TOML table. Writes go through a temporary file and a
//! rename so a crash never leaves a half-written file behind.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::flags::{FlagResult, FlagStore, FlagStoreError};

type FlagTable = BTreeMap<String, String>;

/// Flag store persisted to a TOML file
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_table(&self) -> FlagResult<FlagTable> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(FlagTable::new()),
            Err(err) => {
                return Err(FlagStoreError::Read(format!(
                    "{}: {}",
                    self.path.display(),
                    err
                )));
            }
        };

        toml::from_str(&contents).map_err(|err| {
            FlagStoreError::Corrupted(format!("{}: {}", self.path.display(), err))
        })
    }

    async fn write_table(&self, table: &FlagTable) -> FlagResult<()> {
        let write_err = |err: std::io::Error| {
            FlagStoreError::Write(format!("{}: {}", self.path.display(), err))
        };

        if table.is_empty() {
            return match fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(write_err(err)),
            };
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await.map_err(write_err)?;
        }

        let contents = toml::to_string(table)
            .map_err(|err| FlagStoreError::Write(format!("failed to serialize flags: {}", err)))?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, contents).await.map_err(write_err)?;
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }
}

#[async_trait]
impl FlagStore for FileFlagStore {
    async fn get(&self, key: &str) -> FlagResult<Option<String>> {
        Ok(self.read_table().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> FlagResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut table = match self.read_table().await {
            Ok(table) => table,
            Err(FlagStoreError::Corrupted(_)) => FlagTable::new(),
            Err(err) => return Err(err),
        };
        table.insert(key.to_string(), value.to_string());
        self.write_table(&table).await?;
        debug!(key, path = %self.path.display(), "Flag set");
        Ok(())
    }

    async fn remove(&self, key: &str) -> FlagResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut table = match self.read_table().await {
            Ok(table) => table,
            Err(FlagStoreError::Corrupted(_)) => FlagTable::new(),
            Err(err) => return Err(err),
        };
        if table.remove(key).is_none() && self.path.exists() {
            return Ok(());
        }
        self.write_table(&table).await?;
        debug!(key, path = %self.path.display(), "Flag removed");
        Ok(())
    }
}
