//! Provider-side credential cache
//!
//! Keeps the signed-in identity and its tokens on disk so a session survives
//! process restarts, the way a browser SDK keeps them in local storage.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::identity::Identity;
use crate::error::Result;

/// Seconds before expiry at which a token is treated as expired
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Identity plus the tokens that prove it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredentials {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
}

impl CachedCredentials {
    /// Whether the id token needs refreshing at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// TOML file holding at most one set of credentials
#[derive(Debug, Clone)]
pub struct CredentialCache {
    path: Option<PathBuf>,
}

impl CredentialCache {
    /// Cache persisted at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Cache that never touches the disk
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read cached credentials, failing on unreadable or corrupted files
    pub fn read(&self) -> Result<Option<CachedCredentials>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(toml::from_str(&contents)?))
    }

    /// Read cached credentials; unreadable files are treated as empty
    pub fn load(&self) -> Option<CachedCredentials> {
        match self.read() {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(path = ?self.path, code = err.code(), error = %err, "Ignoring unusable credential cache");
                None
            }
        }
    }

    pub fn store(&self, credentials: &CachedCredentials) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string(credentials)?)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}
