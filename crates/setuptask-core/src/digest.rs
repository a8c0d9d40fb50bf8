//! Content hashes for hash-based staleness

use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `bytes`
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 hex digest over the names and contents of `paths`, in order
///
/// A missing file hashes differently from an empty one, so creating or
/// deleting an input also changes the hash.
///
/// # Errors
/// Returns error if an existing file cannot be read
pub fn files_hash<P: AsRef<Path>>(paths: &[P]) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        let path = path.as_ref();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update([0]);
        match std::fs::read(path) {
            Ok(content) => {
                hasher.update([1]);
                hasher.update(&content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => hasher.update([2]),
            Err(e) => return Err(e),
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}
