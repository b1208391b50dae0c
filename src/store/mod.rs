//! Loading and persisting epic documents.

pub mod file;
pub mod lock;
pub mod memory;
pub mod xml;

use crate::error::Result;
use crate::types::Epic;

pub use file::FileStore;
pub use lock::DocumentLock;
pub use memory::MemoryStore;

/// Backing storage for one epic document.
///
/// `save` must be all-or-nothing: after a failed save the previous document
/// is still what `load` returns.
pub trait EpicStore {
    fn load(&self) -> Result<Epic>;

    fn save(&self, epic: &Epic) -> Result<()>;

    /// Hold off other writers until the returned guard drops.
    fn lock(&self) -> Result<Option<DocumentLock>> {
        Ok(None)
    }

    /// Human-readable location, used in logs and output.
    fn location(&self) -> String;
}
