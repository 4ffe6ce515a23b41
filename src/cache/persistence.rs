//! On-disk record storage: one JSON file per cache key
//!
//! Records are written to a temporary sibling and renamed into place so a
//! crash never leaves a half-written `<key>.cache`. Each record carries a
//! format version and a SHA-256 checksum of the value; anything that fails to
//! parse or verify is reported as [`CacheError::Corrupted`] and the caller
//! deletes it.

use crate::cache::entry::CacheEntry;
use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Current record layout
pub const FORMAT_VERSION: u32 = 1;

const RECORD_EXTENSION: &str = "cache";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    format_version: u32,
    key: CacheKey,
    /// base64 of the raw value
    value: String,
    /// hex SHA-256 of the raw value
    checksum: String,
    created_at: DateTime<Utc>,
    ttl_millis: Option<u64>,
    access_count: u64,
    last_accessed: DateTime<Utc>,
}

impl PersistedRecord {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            key: entry.key.clone(),
            value: BASE64.encode(&entry.value),
            checksum: checksum(&entry.value),
            created_at: entry.created_at,
            ttl_millis: entry
                .ttl
                .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            access_count: entry.access_count,
            last_accessed: entry.last_accessed,
        }
    }

    fn into_entry(self, expected: &CacheKey) -> Result<CacheEntry> {
        let corrupted = |reason: String| CacheError::Corrupted {
            key: expected.to_string(),
            reason,
        };

        if self.format_version != FORMAT_VERSION {
            return Err(corrupted(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if &self.key != expected {
            return Err(corrupted(format!("record holds key {}", self.key)));
        }

        let value = BASE64
            .decode(self.value.as_bytes())
            .map_err(|e| corrupted(format!("invalid value encoding: {}", e)))?;
        if checksum(&value) != self.checksum {
            return Err(corrupted("checksum mismatch".to_string()));
        }

        Ok(CacheEntry {
            key: self.key,
            value,
            created_at: self.created_at,
            ttl: self.ttl_millis.map(Duration::from_millis),
            access_count: self.access_count,
            last_accessed: self.last_accessed.max(self.created_at),
        })
    }
}

fn checksum(value: &[u8]) -> String {
    hex::encode(Sha256::digest(value))
}

/// Outcome of loading one file during a directory scan
#[derive(Debug)]
pub enum ScannedRecord {
    Loaded(CacheEntry),
    Corrupted { key: CacheKey, error: CacheError },
}

/// Directory of persisted cache records
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open (and create if needed) the record directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key, RECORD_EXTENSION))
    }

    /// Write (or overwrite) the record for `entry`
    pub fn write(&self, entry: &CacheEntry) -> Result<()> {
        let record = PersistedRecord::from_entry(entry);
        let bytes = serde_json::to_vec(&record)?;

        let path = self.path_for(&entry.key);
        let tmp = path.with_extension(format!("{}.{}", RECORD_EXTENSION, TEMP_EXTENSION));
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!("Persisted cache record {}", entry.key.short());
        Ok(())
    }

    /// Read the record for `key`; `Ok(None)` when no file exists
    pub fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: PersistedRecord =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupted {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        record.into_entry(key).map(Some)
    }

    /// Delete the record for `key`; returns whether a file was removed
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Load every record in the directory
    ///
    /// Leftover temp files are deleted; files whose name is not a cache key are ignored.
    pub fn scan(&self) -> Result<Vec<ScannedRecord>> {
        let mut records = Vec::new();

        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };

            if extension == TEMP_EXTENSION {
                debug!("Removing leftover temp file {}", path.display());
                let _ = fs::remove_file(&path);
                continue;
            }
            if extension != RECORD_EXTENSION {
                continue;
            }

            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(CacheKey::parse)
            else {
                continue;
            };

            match self.read(&key) {
                Ok(Some(entry)) => records.push(ScannedRecord::Loaded(entry)),
                Ok(None) => {}
                Err(error @ CacheError::Corrupted { .. }) => {
                    records.push(ScannedRecord::Corrupted { key, error })
                }
                Err(e) => warn!("Skipping unreadable cache record {}: {}", path.display(), e),
            }
        }

        Ok(records)
    }

    /// Delete every record; returns how many files were removed
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let is_ours = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == RECORD_EXTENSION || e == TEMP_EXTENSION);
            if is_ours {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(removed)
    }
}
