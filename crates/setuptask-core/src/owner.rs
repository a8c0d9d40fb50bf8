//! Owning objects

use std::path::PathBuf;

/// A provisionable object that owns setup tasks and a stamp directory
pub trait SetupTaskOwner: Send + Sync + 'static {
    /// Directory holding this owner's stamps
    ///
    /// Must be private to this owner; two owners never share a stamp path.
    fn stamp_path(&self) -> PathBuf;

    /// Name used in logs and context keys
    fn owner_name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or_default()
            .to_string()
    }
}
