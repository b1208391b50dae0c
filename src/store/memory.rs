use std::cell::{Cell, RefCell};

use crate::error::Result;
use crate::store::{xml, EpicStore};
use crate::types::Epic;

/// In-process store that keeps the encoded document text.
///
/// Every save goes through the XML codec, so what tests observe is exactly
/// what a file store would have written.
#[derive(Debug, Default)]
pub struct MemoryStore {
    text: RefCell<String>,
    saves: Cell<usize>,
}

impl MemoryStore {
    pub fn new(epic: &Epic) -> Result<Self> {
        Ok(Self::from_xml(xml::encode(epic)?))
    }

    pub fn from_xml(text: impl Into<String>) -> Self {
        Self {
            text: RefCell::new(text.into()),
            saves: Cell::new(0),
        }
    }

    /// Current document text.
    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

impl EpicStore for MemoryStore {
    fn load(&self) -> Result<Epic> {
        xml::decode(&self.text.borrow())
    }

    fn save(&self, epic: &Epic) -> Result<()> {
        let text = xml::encode(epic)?;
        *self.text.borrow_mut() = text;
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
