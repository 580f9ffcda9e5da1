//! Native tree layer
//!
//! The primitives a parser or tree builder uses to create, link and free
//! records. They behave like a C tree library:
//! - constructors report bad input through the heap's `ErrorChannel` and
//!   return `None`
//! - linking helpers check structural preconditions through the contract
//! - `free_*` release memory without repairing links; callers detach first

use crate::arena::NativeArena;
use crate::error::{ErrorDomain, NativeError, Result};
use crate::heap::Heap;
use crate::types::{tag, Kind, NativeRecord, NsRecord, RecordPtr, StdRecord};

/// Create an empty document. Documents point at themselves as owner.
pub fn new_document(heap: &Heap, html: bool) -> RecordPtr {
    let tag = if html { tag::HTML_DOCUMENT } else { tag::DOCUMENT };
    let mut arena = heap.arena_mut();
    let doc = arena.alloc(NativeRecord::Std(StdRecord::new(tag, "")));
    if let Some(record) = arena.std_mut(doc) {
        record.doc = Some(doc);
    }
    tracing::trace!(%doc, html, "allocated document");
    doc
}

pub fn new_element(heap: &Heap, doc: Option<RecordPtr>, name: &str) -> Result<Option<RecordPtr>> {
    check_document(heap, "new_element", doc)?;
    if !is_name(name) {
        invalid_name(heap, "element", name);
        return Ok(None);
    }
    let record = StdRecord::new(tag::ELEMENT, name).in_document(doc);
    Ok(Some(alloc(heap, record)))
}

pub fn new_text(heap: &Heap, doc: Option<RecordPtr>, content: &str) -> Result<RecordPtr> {
    check_document(heap, "new_text", doc)?;
    let record = StdRecord::new(tag::TEXT, "text")
        .with_content(content)
        .in_document(doc);
    Ok(alloc(heap, record))
}

pub fn new_cdata(heap: &Heap, doc: Option<RecordPtr>, content: &str) -> Result<RecordPtr> {
    check_document(heap, "new_cdata", doc)?;
    let record = StdRecord::new(tag::CDATA_SECTION, "")
        .with_content(content)
        .in_document(doc);
    Ok(alloc(heap, record))
}

pub fn new_comment(heap: &Heap, doc: Option<RecordPtr>, content: &str) -> Result<RecordPtr> {
    check_document(heap, "new_comment", doc)?;
    let record = StdRecord::new(tag::COMMENT, "comment")
        .with_content(content)
        .in_document(doc);
    Ok(alloc(heap, record))
}

pub fn new_pi(
    heap: &Heap,
    doc: Option<RecordPtr>,
    target: &str,
    content: &str,
) -> Result<Option<RecordPtr>> {
    check_document(heap, "new_pi", doc)?;
    if !is_ncname(target) {
        invalid_name(heap, "processing instruction target", target);
        return Ok(None);
    }
    if target.eq_ignore_ascii_case("xml") {
        heap.errors().record(NativeError::new(
            ErrorDomain::Tree,
            NativeError::RESERVED_PI_TARGET,
            format!("processing instruction target '{target}' is reserved"),
        ));
        return Ok(None);
    }
    let record = StdRecord::new(tag::PI, target)
        .with_content(content)
        .in_document(doc);
    Ok(Some(alloc(heap, record)))
}

pub fn new_dtd(heap: &Heap, doc: Option<RecordPtr>, name: &str) -> Result<Option<RecordPtr>> {
    check_document(heap, "new_dtd", doc)?;
    if !is_name(name) {
        invalid_name(heap, "dtd", name);
        return Ok(None);
    }
    let record = StdRecord::new(tag::DTD, name).in_document(doc);
    Ok(Some(alloc(heap, record)))
}

/// Set an unqualified attribute, updating it in place when it exists
pub fn set_attribute(
    heap: &Heap,
    element: RecordPtr,
    name: &str,
    value: &str,
) -> Result<Option<RecordPtr>> {
    let owner = heap.expect_element("set_attribute", element)?;
    if !is_name(name) {
        invalid_name(heap, "attribute", name);
        return Ok(None);
    }

    let mut arena = heap.arena_mut();
    let existing = arena.properties(element).into_iter().find(|&attr| {
        arena
            .std(attr)
            .is_some_and(|record| record.name == name && record.ns.is_none())
    });
    if let Some(attr) = existing {
        if let Some(record) = arena.std_mut(attr) {
            record.content = Some(value.to_string());
        }
        return Ok(Some(attr));
    }

    let record = StdRecord::new(tag::ATTRIBUTE, name)
        .with_content(value)
        .in_document(owner.doc);
    let attr = arena.alloc(NativeRecord::Std(record));
    append_property(&mut arena, element, attr);
    Ok(Some(attr))
}

/// Create a namespace declaration, optionally declared on `element`
pub fn new_namespace(
    heap: &Heap,
    element: Option<RecordPtr>,
    href: &str,
    prefix: Option<&str>,
) -> Result<Option<RecordPtr>> {
    let owner = match element {
        Some(ptr) => Some(heap.expect_element("new_namespace", ptr)?),
        None => None,
    };

    if let Some(prefix) = prefix {
        if prefix == "xml" {
            heap.errors().record(NativeError::new(
                ErrorDomain::Namespace,
                NativeError::RESERVED_PREFIX,
                "the 'xml' prefix cannot be redeclared",
            ));
            return Ok(None);
        }
        if !is_ncname(prefix) {
            invalid_name(heap, "namespace prefix", prefix);
            return Ok(None);
        }
    }

    let mut record = NsRecord::new(href, prefix);
    let Some((element, owner)) = element.zip(owner) else {
        return Ok(Some(heap.arena_mut().alloc(NativeRecord::Ns(record))));
    };

    if declares_prefix(&heap.arena(), element, prefix) {
        prefix_redefined(heap, prefix);
        return Ok(None);
    }

    record.context = owner.doc;
    let mut arena = heap.arena_mut();
    let ns = arena.alloc(NativeRecord::Ns(record));
    append_ns_def(&mut arena, element, ns);
    tracing::trace!(%ns, %element, "declared namespace");
    Ok(Some(ns))
}

/// Point an element or attribute at a namespace declaration
pub fn set_namespace(heap: &Heap, node: RecordPtr, ns: Option<RecordPtr>) -> Result<()> {
    let record = heap.std_record("set_namespace", node)?;
    heap.contract().check(
        record.tag == tag::ELEMENT || record.tag == tag::ATTRIBUTE,
        "set_namespace",
        node,
        "only elements and attributes carry a namespace",
    )?;
    if let Some(ns) = ns {
        heap.ns_record("set_namespace", ns)?;
    }
    if let Some(record) = heap.arena_mut().std_mut(node) {
        record.ns = ns;
    }
    Ok(())
}

/// Append an unlinked node to `parent`'s children
pub fn add_child(heap: &Heap, parent: RecordPtr, child: RecordPtr) -> Result<()> {
    const OP: &str = "add_child";
    let contract = heap.contract();
    let owner = heap.std_record(OP, parent)?;
    let node = heap.std_record(OP, child)?;

    let parent_kind = Kind::from_tag(owner.tag);
    let child_kind = Kind::from_tag(node.tag);
    contract.check(
        matches!(parent_kind, Some(kind) if kind == Kind::Element || kind.is_document()),
        OP,
        parent,
        "only elements and documents have children",
    )?;
    contract.check(
        matches!(child_kind, Some(kind) if kind.is_child()),
        OP,
        child,
        "record cannot be placed in a children list",
    )?;
    contract.check(
        child_kind != Some(Kind::Dtd) || parent_kind.is_some_and(Kind::is_document),
        OP,
        child,
        "a dtd can only be a child of a document",
    )?;
    contract.check(node.is_unlinked(), OP, child, "child is still linked; detach it first")?;
    let cyclic = is_ancestor_or_self(&heap.arena(), child, parent);
    contract.check(!cyclic, OP, child, "child is an ancestor of the new parent")?;

    let mut arena = heap.arena_mut();
    if let Some(last) = owner.last {
        if let Some(record) = arena.std_mut(last) {
            record.next = Some(child);
        }
    }
    if let Some(record) = arena.std_mut(child) {
        record.parent = Some(parent);
        record.prev = owner.last;
    }
    if let Some(record) = arena.std_mut(parent) {
        if record.children.is_none() {
            record.children = Some(child);
        }
        record.last = Some(child);
    }
    set_tree_doc(&mut arena, child, owner.doc);
    tracing::debug!(%child, %parent, "linked child");
    Ok(())
}

/// Append an unlinked attribute to `element`. An unqualified attribute of
/// the same name is replaced and freed.
pub fn add_attribute(heap: &Heap, element: RecordPtr, attr: RecordPtr) -> Result<()> {
    const OP: &str = "add_attribute";
    let owner = heap.expect_element(OP, element)?;
    let record = heap.std_record(OP, attr)?;
    heap.contract()
        .check(record.tag == tag::ATTRIBUTE, OP, attr, "expected an attribute")?;
    heap.contract()
        .check(record.is_unlinked(), OP, attr, "attribute is still linked; detach it first")?;

    let mut arena = heap.arena_mut();
    if record.ns.is_none() {
        let replaced = arena.properties(element).into_iter().find(|&other| {
            arena
                .std(other)
                .is_some_and(|r| r.name == record.name && r.ns.is_none())
        });
        if let Some(old) = replaced {
            unlink_property(&mut arena, element, old);
            free_subtree(&mut arena, old);
        }
    }
    append_property(&mut arena, element, attr);
    set_tree_doc(&mut arena, attr, owner.doc);
    tracing::debug!(%attr, %element, "linked attribute");
    Ok(())
}

/// Append a standalone namespace declaration to `element`.
///
/// Returns `false` (and records an error) if the element already declares
/// the prefix.
pub fn add_namespace(heap: &Heap, element: RecordPtr, ns: RecordPtr) -> Result<bool> {
    const OP: &str = "add_namespace";
    let owner = heap.expect_element(OP, element)?;
    let record = heap.ns_record(OP, ns)?;
    let listed = heap.arena().ns_defs(element).contains(&ns);
    heap.contract().check(
        record.next.is_none() && !listed,
        OP,
        ns,
        "namespace is still linked; detach it first",
    )?;

    if declares_prefix(&heap.arena(), element, record.prefix.as_deref()) {
        prefix_redefined(heap, record.prefix.as_deref());
        return Ok(false);
    }

    let mut arena = heap.arena_mut();
    append_ns_def(&mut arena, element, ns);
    if let Some(record) = arena.ns_mut(ns) {
        record.context = owner.doc;
    }
    tracing::debug!(%ns, %element, "linked namespace");
    Ok(true)
}

/// Free a node with its children, attributes and namespace declarations.
/// The node must already be unlinked. Returns the number of records freed.
pub fn free_node(heap: &Heap, node: RecordPtr) -> Result<usize> {
    const OP: &str = "free_node";
    let record = heap.std_record(OP, node)?;
    heap.contract().check(
        Kind::from_tag(record.tag).is_some_and(|kind| kind != Kind::Attribute),
        OP,
        node,
        "use free_prop for attributes",
    )?;
    heap.contract()
        .check(record.is_unlinked(), OP, node, "node is still linked; detach it first")?;
    Ok(free_subtree(&mut heap.arena_mut(), node))
}

/// Free an unlinked attribute
pub fn free_prop(heap: &Heap, attr: RecordPtr) -> Result<()> {
    const OP: &str = "free_prop";
    let record = heap.std_record(OP, attr)?;
    heap.contract()
        .check(record.tag == tag::ATTRIBUTE, OP, attr, "expected an attribute")?;
    heap.contract()
        .check(record.is_unlinked(), OP, attr, "attribute is still linked; detach it first")?;
    free_subtree(&mut heap.arena_mut(), attr);
    Ok(())
}

/// Free a standalone namespace declaration
pub fn free_ns(heap: &Heap, ns: RecordPtr) -> Result<()> {
    const OP: &str = "free_ns";
    heap.ns_record(OP, ns)?;
    let declaring = heap.arena().declaring_element(ns);
    heap.contract().check(
        declaring.is_none(),
        OP,
        ns,
        "namespace is still declared on an element; detach it first",
    )?;
    free_subtree(&mut heap.arena_mut(), ns);
    Ok(())
}

/// Free a whole document and everything it owns
pub fn free_doc(heap: &Heap, doc: RecordPtr) -> Result<usize> {
    let record = heap.std_record("free_doc", doc)?;
    heap.contract().check(
        Kind::from_tag(record.tag).is_some_and(Kind::is_document),
        "free_doc",
        doc,
        "expected a document",
    )?;
    let freed = free_subtree(&mut heap.arena_mut(), doc);
    tracing::debug!(%doc, freed, "freed document");
    Ok(freed)
}

/// Free `root` and everything hanging off it. No link repair, no checks.
pub(crate) fn free_subtree(arena: &mut NativeArena, root: RecordPtr) -> usize {
    let mut stack = vec![root];
    let mut freed = 0;

    while let Some(ptr) = stack.pop() {
        match arena.get(ptr) {
            Some(NativeRecord::Std(record)) => {
                stack.extend(arena.siblings(record.children));
                stack.extend(arena.siblings(record.properties));
                stack.extend(arena.ns_chain(record.ns_def));
            }
            Some(NativeRecord::Ns(_)) => {}
            None => continue,
        }
        if arena.free(ptr).is_some() {
            tracing::trace!(%ptr, "freed record");
            freed += 1;
        }
    }
    freed
}

/// Rewrite owning-document pointers across a subtree
pub(crate) fn set_tree_doc(arena: &mut NativeArena, root: RecordPtr, doc: Option<RecordPtr>) {
    for ptr in arena.subtree(root) {
        let properties = arena.properties(ptr);
        let ns_defs = arena.ns_defs(ptr);
        if let Some(record) = arena.std_mut(ptr) {
            record.doc = doc;
        }
        for attr in properties {
            if let Some(record) = arena.std_mut(attr) {
                record.doc = doc;
            }
        }
        for ns in ns_defs {
            if let Some(record) = arena.ns_mut(ns) {
                record.context = doc;
            }
        }
    }
}

/// Remove `attr` from `element`'s property list, leaving `attr` itself alone
pub(crate) fn unlink_property(arena: &mut NativeArena, element: RecordPtr, attr: RecordPtr) {
    let Some((prev, next)) = arena.std(attr).map(|r| (r.prev, r.next)) else {
        return;
    };
    match prev {
        Some(prev) => {
            if let Some(record) = arena.std_mut(prev) {
                record.next = next;
            }
        }
        None => {
            if let Some(record) = arena.std_mut(element) {
                record.properties = next;
            }
        }
    }
    if let Some(next) = next {
        if let Some(record) = arena.std_mut(next) {
            record.prev = prev;
        }
    }
}

pub(crate) fn declares_prefix(arena: &NativeArena, element: RecordPtr, prefix: Option<&str>) -> bool {
    arena
        .ns_defs(element)
        .into_iter()
        .any(|ns| arena.ns(ns).is_some_and(|r| r.prefix.as_deref() == prefix))
}

pub(crate) fn append_ns_def(arena: &mut NativeArena, element: RecordPtr, ns: RecordPtr) {
    match arena.ns_defs(element).last().copied() {
        Some(last) => {
            if let Some(record) = arena.ns_mut(last) {
                record.next = Some(ns);
            }
        }
        None => {
            if let Some(record) = arena.std_mut(element) {
                record.ns_def = Some(ns);
            }
        }
    }
}

fn append_property(arena: &mut NativeArena, element: RecordPtr, attr: RecordPtr) {
    let last = arena.properties(element).last().copied();
    match last {
        Some(last) => {
            if let Some(record) = arena.std_mut(last) {
                record.next = Some(attr);
            }
        }
        None => {
            if let Some(record) = arena.std_mut(element) {
                record.properties = Some(attr);
            }
        }
    }
    if let Some(record) = arena.std_mut(attr) {
        record.parent = Some(element);
        record.prev = last;
        record.next = None;
    }
}

fn is_ancestor_or_self(arena: &NativeArena, candidate: RecordPtr, node: RecordPtr) -> bool {
    let mut cursor = Some(node);
    while let Some(ptr) = cursor {
        if ptr == candidate {
            return true;
        }
        cursor = arena.std(ptr).and_then(|record| record.parent);
    }
    false
}

fn alloc(heap: &Heap, record: StdRecord) -> RecordPtr {
    let ptr = heap.arena_mut().alloc(NativeRecord::Std(record));
    tracing::trace!(%ptr, "allocated record");
    ptr
}

fn check_document(heap: &Heap, operation: &'static str, doc: Option<RecordPtr>) -> Result<()> {
    let Some(doc) = doc else {
        return Ok(());
    };
    let record = heap.std_record(operation, doc)?;
    heap.contract().check(
        Kind::from_tag(record.tag).is_some_and(Kind::is_document),
        operation,
        doc,
        "expected a document",
    )
}

fn invalid_name(heap: &Heap, what: &str, name: &str) {
    heap.errors().record(NativeError::new(
        ErrorDomain::Tree,
        NativeError::INVALID_NAME,
        format!("invalid {what} name '{name}'"),
    ));
}

fn prefix_redefined(heap: &Heap, prefix: Option<&str>) {
    let shown = prefix.unwrap_or("(default)");
    heap.errors().record(NativeError::new(
        ErrorDomain::Namespace,
        NativeError::PREFIX_REDEFINED,
        format!("namespace prefix {shown} is already declared on this element"),
    ));
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ':'))
}

fn is_ncname(name: &str) -> bool {
    is_name(name) && !name.contains(':')
}
