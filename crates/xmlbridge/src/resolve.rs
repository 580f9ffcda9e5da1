//! In-scope namespace lookups
//!
//! Both lookups start at an element and walk up through element ancestors.
//! For namespace wrappers the starting element comes from the shim (see
//! `Wrapper::resolve_namespace_for_prefix`), never from the namespace record.

use crate::arena::NativeArena;
use crate::error::Result;
use crate::heap::Heap;
use crate::types::{tag, RecordPtr};

/// Nearest declaration of `prefix` (`None` = default namespace) in scope at
/// `element`. Returns the declaration and the element declaring it.
pub fn namespace_for_prefix(
    heap: &Heap,
    element: RecordPtr,
    prefix: Option<&str>,
) -> Result<Option<(RecordPtr, RecordPtr)>> {
    heap.expect_element("namespace_for_prefix", element)?;
    Ok(lookup_prefix(&heap.arena(), element, prefix))
}

/// Prefix bound to `uri` in scope at `element`; the default namespace
/// yields `""`. Declarations shadowed by a nearer one are skipped.
pub fn prefix_for_uri(heap: &Heap, element: RecordPtr, uri: &str) -> Result<Option<String>> {
    heap.expect_element("prefix_for_uri", element)?;
    let arena = heap.arena();

    for (ns, _) in in_scope(&arena, element) {
        let Some(record) = arena.ns(ns) else {
            continue;
        };
        if record.href != uri {
            continue;
        }
        let prefix = record.prefix.as_deref();
        let nearest = lookup_prefix(&arena, element, prefix).map(|(found, _)| found);
        if nearest == Some(ns) {
            return Ok(Some(prefix.unwrap_or_default().to_string()));
        }
    }
    Ok(None)
}

fn lookup_prefix(
    arena: &NativeArena,
    element: RecordPtr,
    prefix: Option<&str>,
) -> Option<(RecordPtr, RecordPtr)> {
    in_scope(arena, element)
        .into_iter()
        .find(|&(ns, _)| arena.ns(ns).is_some_and(|r| r.prefix.as_deref() == prefix))
}

/// Every declaration visible at `element`, nearest first
fn in_scope(arena: &NativeArena, element: RecordPtr) -> Vec<(RecordPtr, RecordPtr)> {
    let mut out = Vec::new();
    let mut cursor = Some(element);
    while let Some(ptr) = cursor {
        let Some(record) = arena.std(ptr) else {
            break;
        };
        if record.tag != tag::ELEMENT {
            break;
        }
        out.extend(arena.ns_defs(ptr).into_iter().map(|ns| (ns, ptr)));
        cursor = record.parent;
    }
    out
}
