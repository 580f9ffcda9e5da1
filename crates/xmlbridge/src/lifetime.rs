//! Ownership token and the release routine
//!
//! Reference counting only governs wrappers. Native memory is freed in one
//! place, [`release`], and only for wrappers holding [`Ownership::Owning`].

use crate::error::Result;
use crate::heap::Heap;
use crate::native;
use crate::types::{Kind, RecordPtr};

/// Whether a wrapper's teardown frees its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Teardown frees the record and everything it owns
    Owning,
    /// Teardown leaves native memory alone
    Borrowed,
}

impl Ownership {
    pub fn from_flag(owns_native: bool) -> Self {
        if owns_native {
            Ownership::Owning
        } else {
            Ownership::Borrowed
        }
    }

    pub fn owns_native(self) -> bool {
        self == Ownership::Owning
    }
}

/// Free the record behind an owning wrapper.
///
/// The record must be unlinked: a linked record belongs to its tree's owner,
/// and freeing it here would leave the neighbours pointing at a dead slot.
/// For namespaces, `ns_parent` is the wrapper's shim value; the element
/// lists are checked as well, since the shim can be out of date.
pub fn release(heap: &Heap, ptr: RecordPtr, kind: Kind, ns_parent: Option<RecordPtr>) -> Result<()> {
    const OP: &str = "release";
    let live = heap.is_live(ptr);
    heap.contract().check(
        live,
        OP,
        ptr,
        "owning wrapper outlived its record (already freed elsewhere)",
    )?;

    match kind {
        Kind::Namespace => {
            let declared = ns_parent.is_some() || heap.arena().declaring_element(ptr).is_some();
            heap.contract().check(
                !declared,
                OP,
                ptr,
                "namespace is still declared on an element",
            )?;
            native::free_ns(heap, ptr)?;
        }
        Kind::Attribute => {
            native::free_prop(heap, ptr)?;
        }
        Kind::Document | Kind::HtmlDocument => {
            native::free_doc(heap, ptr)?;
        }
        Kind::Element
        | Kind::Text
        | Kind::CData
        | Kind::ProcessingInstruction
        | Kind::Comment
        | Kind::Dtd => {
            let record = heap.std_record(OP, ptr)?;
            heap.contract().check(
                record.is_unlinked(),
                OP,
                ptr,
                "node is still linked into a tree; detach it first",
            )?;
            // Children, attributes and declarations go with it
            native::free_node(heap, ptr)?;
        }
    }

    tracing::debug!(%ptr, %kind, "released native record");
    Ok(())
}
