//! Namespace parent shim
//!
//! Namespace records have no parent field. Each namespace wrapper carries
//! this shim instead, and every parent or ancestor question about a
//! namespace goes through it.

use crate::types::RecordPtr;
use std::cell::Cell;

/// The declaring element of one namespace wrapper
#[derive(Debug, Default)]
pub struct NamespaceParentShim {
    parent: Cell<Option<RecordPtr>>,
}

impl NamespaceParentShim {
    pub fn new(parent: Option<RecordPtr>) -> Self {
        Self {
            parent: Cell::new(parent),
        }
    }

    pub fn get(&self) -> Option<RecordPtr> {
        self.parent.get()
    }

    pub fn set(&self, parent: Option<RecordPtr>) {
        self.parent.set(parent);
    }

    /// Forget the parent; called whenever the namespace leaves its element
    pub fn clear(&self) {
        self.parent.set(None);
    }
}
