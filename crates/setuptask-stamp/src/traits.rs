//! Stamp store trait

use std::path::Path;

use crate::error::StampError;
use crate::stamp::Stamp;

/// Persistence for task completion stamps
///
/// Every operation is keyed by the owner's stamp directory and a task name.
/// Stamp I/O is synchronous; callers never hold a stamp operation across an
/// await point.
pub trait StampStore: Send + Sync {
    /// Look up the stamp for a task
    ///
    /// An absent stamp is `Ok(None)`, never an error.
    ///
    /// # Errors
    /// Returns error if the stamp exists but cannot be read
    fn check(&self, owner: &Path, task: &str) -> Result<Option<Stamp>, StampError>;

    /// Write (or overwrite) the stamp for a task
    ///
    /// Creates the owner directory if it does not exist yet.
    ///
    /// # Errors
    /// Returns error if the stamp cannot be written
    fn create(
        &self,
        owner: &Path,
        task: &str,
        hash: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Stamp, StampError>;

    /// Remove the stamp for a task; removing an absent stamp succeeds
    ///
    /// # Errors
    /// Returns error if an existing stamp cannot be removed
    fn delete(&self, owner: &Path, task: &str) -> Result<(), StampError>;

    /// All stamps recorded for an owner, sorted by task name
    ///
    /// # Errors
    /// Returns error if the owner directory cannot be read
    fn list(&self, owner: &Path) -> Result<Vec<Stamp>, StampError>;

    /// Remove every stamp of an owner, returning how many were removed
    ///
    /// # Errors
    /// Returns error if any stamp cannot be removed
    fn clear(&self, owner: &Path) -> Result<usize, StampError> {
        let stamps = self.list(owner)?;
        for stamp in &stamps {
            self.delete(owner, &stamp.task)?;
        }
        Ok(stamps.len())
    }

    /// Short name of the store implementation, for logging
    fn store_type(&self) -> &'static str;
}
