//! Detachment protocol
//!
//! Three graduated operations per relation:
//!
//! ```text
//! detach      unlink + clean links + reconcile namespaces + strip doc pointers
//! remove      unlink + free (regardless of any wrapper's ownership)
//! remove_all  free every entry of the list, then empty the list
//! ```
//!
//! `detach` is the only way to relocate a node: the caller ends up holding
//! a standalone root and nothing frees it implicitly.
//!
//! Nothing here can reach wrappers, since no address→wrapper table exists.
//! Callers removing a namespace clear the shim of the wrapper they hold
//! (`Wrapper::detach`/`Wrapper::remove` do this), and any wrapper still
//! pointing at a removed record is dangling: its next access fails the
//! contract check.

use crate::arena::{NativeArena, PtrList};
use crate::error::Result;
use crate::heap::Heap;
use crate::invalidate;
use crate::native::{append_ns_def, free_subtree, unlink_property};
use crate::types::{tag, Kind, NativeRecord, NsRecord, RecordPtr, StdRecord};
use ahash::{AHashMap, AHashSet};
use smallvec::smallvec;

/// Which list of `from` the record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Child,
    Attribute,
    Namespace,
}

pub fn detach(heap: &Heap, relation: Relation, x: RecordPtr, from: RecordPtr) -> Result<()> {
    match relation {
        Relation::Child => detach_child(heap, x, from),
        Relation::Attribute => detach_attribute(heap, x, from),
        Relation::Namespace => detach_namespace(heap, x, from),
    }
}

pub fn remove(heap: &Heap, relation: Relation, x: RecordPtr, from: RecordPtr) -> Result<()> {
    match relation {
        Relation::Child => remove_child(heap, x, from),
        Relation::Attribute => remove_attribute(heap, x, from),
        Relation::Namespace => remove_namespace(heap, x, from),
    }
}

/// Returns how many entries were removed
pub fn remove_all(heap: &Heap, relation: Relation, from: RecordPtr) -> Result<usize> {
    match relation {
        Relation::Child => remove_all_children(heap, from),
        Relation::Attribute => remove_all_attributes(heap, from),
        Relation::Namespace => remove_all_namespaces(heap, from),
    }
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

pub fn detach_child(heap: &Heap, child: RecordPtr, parent: RecordPtr) -> Result<()> {
    const OP: &str = "detach_child";
    let record = check_child(heap, OP, child, parent)?;

    let mut arena = heap.arena_mut();
    unlink_child(&mut arena, parent, child);
    if heap.config().reconcile_namespaces_on_detach && record.tag == tag::ELEMENT {
        reconcile_namespaces(&mut arena, child);
    }
    if record.doc.is_some() {
        invalidate::strip(&mut arena, child);
    }
    tracing::debug!(%child, %parent, "detached child");
    Ok(())
}

pub fn remove_child(heap: &Heap, child: RecordPtr, parent: RecordPtr) -> Result<()> {
    check_child(heap, "remove_child", child, parent)?;

    let mut arena = heap.arena_mut();
    unlink_child(&mut arena, parent, child);
    let freed = free_subtree(&mut arena, child);
    tracing::debug!(%child, %parent, freed, "removed child");
    Ok(())
}

pub fn remove_all_children(heap: &Heap, node: RecordPtr) -> Result<usize> {
    heap.std_record("remove_all_children", node)?;

    let mut arena = heap.arena_mut();
    let children = arena.children(node);
    for &child in &children {
        free_subtree(&mut arena, child);
    }
    if let Some(record) = arena.std_mut(node) {
        record.children = None;
        record.last = None;
    }
    if !children.is_empty() {
        tracing::debug!(%node, removed = children.len(), "removed all children");
    }
    Ok(children.len())
}

fn check_child(
    heap: &Heap,
    operation: &'static str,
    child: RecordPtr,
    parent: RecordPtr,
) -> Result<StdRecord> {
    heap.std_record(operation, parent)?;
    let record = heap.std_record(operation, child)?;
    heap.contract().check(
        Kind::from_tag(record.tag).is_some_and(Kind::is_child),
        operation,
        child,
        "record does not live in a children list",
    )?;
    heap.contract().check(
        record.parent == Some(parent),
        operation,
        child,
        "not attached to the given parent",
    )?;
    Ok(record)
}

/// Unlink `child` from `parent` and clear the child's own links
fn unlink_child(arena: &mut NativeArena, parent: RecordPtr, child: RecordPtr) {
    let Some((prev, next)) = arena.std(child).map(|r| (r.prev, r.next)) else {
        return;
    };

    match prev {
        Some(prev) => {
            if let Some(record) = arena.std_mut(prev) {
                record.next = next;
            }
        }
        None => {
            if let Some(record) = arena.std_mut(parent) {
                record.children = next;
            }
        }
    }
    match next {
        Some(next) => {
            if let Some(record) = arena.std_mut(next) {
                record.prev = prev;
            }
        }
        // Removing the last child moves the parent's last-child cache
        None => {
            if let Some(record) = arena.std_mut(parent) {
                record.last = prev;
            }
        }
    }

    if let Some(record) = arena.std_mut(child) {
        record.parent = None;
        record.prev = None;
        record.next = None;
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Detached attributes cannot carry a namespace declaration of their own,
/// so a namespaced attribute keeps its prefix in its name and drops the
/// namespace reference.
pub fn detach_attribute(heap: &Heap, attr: RecordPtr, element: RecordPtr) -> Result<()> {
    let record = check_attribute(heap, "detach_attribute", attr, element)?;

    let mut arena = heap.arena_mut();
    unlink_property(&mut arena, element, attr);

    let prefix = record
        .ns
        .and_then(|ns| arena.ns(ns))
        .and_then(|ns| ns.prefix.clone());
    if let Some(node) = arena.std_mut(attr) {
        node.parent = None;
        node.prev = None;
        node.next = None;
        node.doc = None;
        node.ns = None;
        if let Some(prefix) = prefix {
            node.name = format!("{prefix}:{}", node.name);
        }
    }
    tracing::debug!(%attr, %element, "detached attribute");
    Ok(())
}

pub fn remove_attribute(heap: &Heap, attr: RecordPtr, element: RecordPtr) -> Result<()> {
    check_attribute(heap, "remove_attribute", attr, element)?;

    let mut arena = heap.arena_mut();
    unlink_property(&mut arena, element, attr);
    free_subtree(&mut arena, attr);
    tracing::debug!(%attr, %element, "removed attribute");
    Ok(())
}

pub fn remove_all_attributes(heap: &Heap, node: RecordPtr) -> Result<usize> {
    heap.std_record("remove_all_attributes", node)?;

    let mut arena = heap.arena_mut();
    let properties = arena.properties(node);
    for &attr in &properties {
        free_subtree(&mut arena, attr);
    }
    if let Some(record) = arena.std_mut(node) {
        record.properties = None;
    }
    Ok(properties.len())
}

fn check_attribute(
    heap: &Heap,
    operation: &'static str,
    attr: RecordPtr,
    element: RecordPtr,
) -> Result<StdRecord> {
    heap.expect_element(operation, element)?;
    let record = heap.std_record(operation, attr)?;
    heap.contract()
        .check(record.tag == tag::ATTRIBUTE, operation, attr, "expected an attribute")?;
    heap.contract().check(
        record.parent == Some(element),
        operation,
        attr,
        "not attached to the given element",
    )?;
    Ok(record)
}

// ---------------------------------------------------------------------------
// Namespaces
// ---------------------------------------------------------------------------

/// Unlink a declaration from `element`. References to it inside the
/// element's subtree are cleared.
pub fn detach_namespace(heap: &Heap, ns: RecordPtr, element: RecordPtr) -> Result<()> {
    check_namespace(heap, "detach_namespace", ns, element)?;

    let mut arena = heap.arena_mut();
    unlink_ns(&mut arena, element, ns);
    clear_ns_references(&mut arena, element, ns);
    if let Some(record) = arena.ns_mut(ns) {
        record.context = None;
    }
    tracing::debug!(%ns, %element, "detached namespace");
    Ok(())
}

pub fn remove_namespace(heap: &Heap, ns: RecordPtr, element: RecordPtr) -> Result<()> {
    check_namespace(heap, "remove_namespace", ns, element)?;

    let mut arena = heap.arena_mut();
    unlink_ns(&mut arena, element, ns);
    clear_ns_references(&mut arena, element, ns);
    free_subtree(&mut arena, ns);
    tracing::debug!(%ns, %element, "removed namespace");
    Ok(())
}

pub fn remove_all_namespaces(heap: &Heap, node: RecordPtr) -> Result<usize> {
    heap.std_record("remove_all_namespaces", node)?;

    let mut arena = heap.arena_mut();
    let ns_defs = arena.ns_defs(node);
    for &ns in &ns_defs {
        clear_ns_references(&mut arena, node, ns);
        free_subtree(&mut arena, ns);
    }
    if let Some(record) = arena.std_mut(node) {
        record.ns_def = None;
    }
    Ok(ns_defs.len())
}

fn check_namespace(
    heap: &Heap,
    operation: &'static str,
    ns: RecordPtr,
    element: RecordPtr,
) -> Result<()> {
    heap.expect_element(operation, element)?;
    heap.ns_record(operation, ns)?;
    let declared = heap.arena().ns_defs(element).contains(&ns);
    heap.contract()
        .check(declared, operation, ns, "not declared on the given element")
}

fn unlink_ns(arena: &mut NativeArena, element: RecordPtr, ns: RecordPtr) {
    let next = arena.ns(ns).and_then(|record| record.next);
    let defs = arena.ns_defs(element);
    let previous = defs
        .iter()
        .position(|&candidate| candidate == ns)
        .and_then(|i| i.checked_sub(1))
        .map(|i| defs[i]);

    match previous {
        Some(previous) => {
            if let Some(record) = arena.ns_mut(previous) {
                record.next = next;
            }
        }
        None => {
            if let Some(record) = arena.std_mut(element) {
                record.ns_def = next;
            }
        }
    }
    if let Some(record) = arena.ns_mut(ns) {
        record.next = None;
    }
}

/// Drop every element/attribute reference to `ns` under `root`
fn clear_ns_references(arena: &mut NativeArena, root: RecordPtr, ns: RecordPtr) {
    for ptr in arena.subtree(root) {
        let mut holders: PtrList = smallvec![ptr];
        holders.extend(arena.properties(ptr));
        for holder in holders {
            if let Some(record) = arena.std_mut(holder) {
                if record.ns == Some(ns) {
                    record.ns = None;
                }
            }
        }
    }
}

/// Give `root` its own copy of every namespace declaration its subtree
/// references from outside. Returns the number of copies made.
pub(crate) fn reconcile_namespaces(arena: &mut NativeArena, root: RecordPtr) -> usize {
    let subtree = arena.subtree(root);
    let declared: AHashSet<RecordPtr> = subtree
        .iter()
        .flat_map(|&ptr| arena.ns_defs(ptr))
        .collect();
    let root_doc = arena.std(root).and_then(|record| record.doc);
    let mut copies: AHashMap<RecordPtr, RecordPtr> = AHashMap::new();

    for ptr in subtree {
        let mut holders: PtrList = smallvec![ptr];
        holders.extend(arena.properties(ptr));

        for holder in holders {
            let Some(ns) = arena.std(holder).and_then(|record| record.ns) else {
                continue;
            };
            if declared.contains(&ns) {
                continue;
            }

            let copy = match copies.get(&ns).copied() {
                Some(copy) => Some(copy),
                None => arena.ns(ns).cloned().map(|original| {
                    let prefix = free_prefix(arena, root, original.prefix);
                    let mut record = NsRecord::new(original.href, prefix.as_deref());
                    record.context = root_doc;
                    let copy = arena.alloc(NativeRecord::Ns(record));
                    append_ns_def(arena, root, copy);
                    copies.insert(ns, copy);
                    copy
                }),
            };
            // A reference to an already freed declaration is simply dropped
            if let Some(record) = arena.std_mut(holder) {
                record.ns = copy;
            }
        }
    }

    if !copies.is_empty() {
        tracing::debug!(%root, copies = copies.len(), "reconciled namespaces");
    }
    copies.len()
}

/// `wanted` if `root` does not declare it yet, otherwise a numbered variant
fn free_prefix(arena: &NativeArena, root: RecordPtr, wanted: Option<String>) -> Option<String> {
    let taken = |prefix: Option<&str>| {
        arena
            .ns_defs(root)
            .into_iter()
            .any(|ns| arena.ns(ns).is_some_and(|r| r.prefix.as_deref() == prefix))
    };
    if !taken(wanted.as_deref()) {
        return wanted;
    }
    let base = wanted.unwrap_or_else(|| "default".to_string());
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken(Some(candidate.as_str())))
}
