//! Recursive invalidation of owning-document pointers
//!
//! A subtree that outlives its document must not keep pointing at it. Run
//! this before the original document is freed whenever the subtree is kept.

use crate::arena::NativeArena;
use crate::error::Result;
use crate::heap::Heap;
use crate::types::{NativeRecord, RecordPtr};

/// Clear every owning-document back-reference under `root`: nodes,
/// attributes and namespace declarations all become standalone.
///
/// Returns how many references were cleared.
pub fn strip_document_pointers(heap: &Heap, root: RecordPtr) -> Result<usize> {
    let live = heap.is_live(root);
    heap.contract().check(
        live,
        "strip_document_pointers",
        root,
        "address does not refer to a live record",
    )?;
    let cleared = strip(&mut heap.arena_mut(), root);
    tracing::debug!(%root, cleared, "stripped document pointers");
    Ok(cleared)
}

pub(crate) fn strip(arena: &mut NativeArena, root: RecordPtr) -> usize {
    if let Some(NativeRecord::Ns(record)) = arena.get_mut(root) {
        return usize::from(record.context.take().is_some());
    }

    let mut cleared = 0;
    for ptr in arena.subtree(root) {
        let properties = arena.properties(ptr);
        let ns_defs = arena.ns_defs(ptr);

        for attr in properties {
            if let Some(record) = arena.std_mut(attr) {
                cleared += usize::from(record.doc.take().is_some());
            }
        }
        for ns in ns_defs {
            if let Some(record) = arena.ns_mut(ns) {
                cleared += usize::from(record.context.take().is_some());
            }
        }
        if let Some(record) = arena.std_mut(ptr) {
            cleared += usize::from(record.doc.take().is_some());
        }
    }
    cleared
}
