//! Filesystem stamp store
//!
//! Each owner directory holds one JSON file per task named
//! `.stamp-<encoded task name>`. Writes go to a temporary file first and are
//! renamed into place, so a reader never observes a half-written stamp.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::error::StampError;
use crate::stamp::Stamp;
use crate::traits::StampStore;

const STAMP_PREFIX: &str = ".stamp-";
const TEMP_PREFIX: &str = ".tmp-stamp-";

/// Stamp store backed by files in each owner's stamp directory
#[derive(Debug, Clone, Default)]
pub struct FsStampStore;

impl FsStampStore {
    /// Create a new filesystem stamp store
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Path of the stamp file for `task` inside `owner`
    ///
    /// # Errors
    /// Returns error if the task name is empty
    pub fn stamp_file(owner: &Path, task: &str) -> Result<PathBuf, StampError> {
        Ok(owner.join(format!("{STAMP_PREFIX}{}", encode_name(task)?)))
    }

    fn read_stamp(path: &Path, task: &str) -> Result<Option<Stamp>, StampError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StampError::io(path, e)),
        };

        // Stamps that predate the JSON format hold a bare hash, or nothing
        let trimmed = content.trim();
        if !trimmed.starts_with('{') {
            warn!(path = %path.display(), "reading legacy stamp");
            let modified = fs::metadata(path)
                .and_then(|m| m.modified())
                .map_err(|e| StampError::io(path, e))?;
            let hash = Some(trimmed).filter(|h| !h.is_empty());
            let mut stamp = Stamp::record(task, hash, None);
            stamp.created_at = DateTime::<Utc>::from(modified);
            return Ok(Some(stamp));
        }

        let stamp: Stamp = serde_json::from_str(&content).map_err(|source| StampError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(stamp))
    }
}

impl StampStore for FsStampStore {
    #[instrument(skip(self), level = "trace")]
    fn check(&self, owner: &Path, task: &str) -> Result<Option<Stamp>, StampError> {
        let path = Self::stamp_file(owner, task)?;
        Self::read_stamp(&path, task)
    }

    #[instrument(skip(self, metadata), level = "debug")]
    fn create(
        &self,
        owner: &Path,
        task: &str,
        hash: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Stamp, StampError> {
        let encoded = encode_name(task)?;
        fs::create_dir_all(owner).map_err(|e| StampError::io(owner, e))?;

        let stamp = Stamp::record(task, hash, metadata);

        let body = serde_json::to_vec_pretty(&stamp).map_err(|source| StampError::Corrupt {
            path: owner.to_path_buf(),
            source,
        })?;

        let temp = owner.join(format!("{TEMP_PREFIX}{encoded}"));
        let target = owner.join(format!("{STAMP_PREFIX}{encoded}"));
        fs::write(&temp, body).map_err(|e| StampError::io(&temp, e))?;
        fs::rename(&temp, &target).map_err(|e| StampError::io(&target, e))?;

        debug!(path = %target.display(), hash = ?stamp.hash, "stamp written");
        Ok(stamp)
    }

    #[instrument(skip(self), level = "debug")]
    fn delete(&self, owner: &Path, task: &str) -> Result<(), StampError> {
        let path = Self::stamp_file(owner, task)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "stamp removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StampError::io(path, e)),
        }
    }

    fn list(&self, owner: &Path) -> Result<Vec<Stamp>, StampError> {
        let entries = match fs::read_dir(owner) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StampError::io(owner, e)),
        };

        let mut stamps = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StampError::io(owner, e))?;
            let file_name = entry.file_name();
            let Some(encoded) = file_name.to_str().and_then(|n| n.strip_prefix(STAMP_PREFIX))
            else {
                continue;
            };
            let Some(task) = decode_name(encoded) else {
                warn!(file = %entry.path().display(), "skipping stamp with undecodable name");
                continue;
            };
            if let Some(stamp) = Self::read_stamp(&entry.path(), &task)? {
                stamps.push(stamp);
            }
        }

        stamps.sort_by(|a, b| a.task.cmp(&b.task));
        Ok(stamps)
    }

    fn store_type(&self) -> &'static str {
        "fs"
    }
}

/// Encode a task name into a file-name-safe form
///
/// ASCII alphanumerics, `-`, `_` and `.` are kept; every other byte becomes
/// `%XX`.
fn encode_name(task: &str) -> Result<String, StampError> {
    if task.is_empty() {
        return Err(StampError::InvalidName(task.to_string()));
    }

    let mut out = String::with_capacity(task.len());
    for byte in task.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    Ok(out)
}

fn decode_name(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
