//! setuptask-stamp: Completion stamps for setup tasks
//!
//! A stamp records that a named task completed for one owning object. Stamps
//! live under the owner's stamp directory, one record per task, optionally
//! carrying a content hash and free-form metadata.

pub mod error;
pub mod fs;
pub mod memory;
pub mod stamp;
pub mod traits;

pub use error::StampError;
pub use fs::FsStampStore;
pub use memory::MemoryStampStore;
pub use stamp::Stamp;
pub use traits::StampStore;
