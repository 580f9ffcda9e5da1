//! Wrappers and the wrapper factory
//!
//! A [`Wrapper`] is the reference-counted face of one native record. The
//! variant is resolved once, at wrap time. There is no address→wrapper
//! table: every `wrap` call mints a new wrapper, so two wrappers may alias
//! one record and see each other's mutations. Use [`Wrapper::is_same_node`]
//! for identity, never `Rc::ptr_eq`.

use crate::classify::classify;
use crate::detach::{self, Relation};
use crate::error::Result;
use crate::heap::Heap;
use crate::lifetime::{self, Ownership};
use crate::native;
use crate::resolve;
use crate::shim::NamespaceParentShim;
use crate::types::{Kind, RecordPtr};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

pub type NodeRef = Rc<Wrapper>;

/// Wrapper flavour, fixed at construction
#[derive(Debug)]
pub enum Variant {
    /// Element, text, comment, processing instruction, CDATA
    Content,
    Attribute,
    /// Namespaces carry their declaring element here
    Namespace(NamespaceParentShim),
    /// Owns the whole tree below it when owning
    Document,
    Dtd,
}

pub struct Wrapper {
    heap: Heap,
    ptr: RecordPtr,
    kind: Kind,
    ownership: Cell<Ownership>,
    variant: Variant,
}

/// Wrap any record except a namespace.
///
/// Asking for `Owning` on a record that is still linked into a tree is a
/// contract violation: the tree's owner frees it.
pub fn wrap(heap: &Heap, ptr: RecordPtr, ownership: Ownership) -> Result<NodeRef> {
    const OP: &str = "wrap";
    let kind = classify(heap, ptr)?;
    let variant = match kind {
        Kind::Namespace => {
            return Err(heap.contract().violation(
                OP,
                ptr,
                "namespace records need their declaring element; use wrap_namespace",
            ))
        }
        Kind::Attribute => Variant::Attribute,
        Kind::Document | Kind::HtmlDocument => Variant::Document,
        Kind::Dtd => Variant::Dtd,
        Kind::Element
        | Kind::Text
        | Kind::CData
        | Kind::ProcessingInstruction
        | Kind::Comment => Variant::Content,
    };

    if ownership.owns_native() {
        let linked = heap.arena().std(ptr).is_some_and(|r| r.parent.is_some());
        heap.contract().check(
            !linked,
            OP,
            ptr,
            "cannot own a record still linked into a tree; detach it first",
        )?;
    }
    Ok(mint(heap, ptr, kind, ownership, variant))
}

/// Wrap a namespace record together with the element declaring it
/// (`None` for a standalone declaration).
pub fn wrap_namespace(
    heap: &Heap,
    ns: RecordPtr,
    parent: Option<RecordPtr>,
    ownership: Ownership,
) -> Result<NodeRef> {
    const OP: &str = "wrap_namespace";
    let kind = classify(heap, ns)?;
    heap.contract()
        .check(kind == Kind::Namespace, OP, ns, "expected a namespace record")?;

    if let Some(parent) = parent {
        heap.expect_element(OP, parent)?;
        let declared = heap.arena().ns_defs(parent).contains(&ns);
        heap.contract()
            .check(declared, OP, ns, "not declared on the given element")?;
    }
    if ownership.owns_native() {
        let declared = parent.is_some() || heap.arena().declaring_element(ns).is_some();
        heap.contract().check(
            !declared,
            OP,
            ns,
            "cannot own a namespace still declared on an element",
        )?;
    }

    let shim = NamespaceParentShim::new(parent);
    Ok(mint(heap, ns, kind, ownership, Variant::Namespace(shim)))
}

fn mint(heap: &Heap, ptr: RecordPtr, kind: Kind, ownership: Ownership, variant: Variant) -> NodeRef {
    tracing::trace!(%ptr, %kind, ?ownership, "minted wrapper");
    Rc::new(Wrapper {
        heap: heap.clone(),
        ptr,
        kind,
        ownership: Cell::new(ownership),
        variant,
    })
}

impl Wrapper {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn ptr(&self) -> RecordPtr {
        self.ptr
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership.get()
    }

    pub fn owns_native(&self) -> bool {
        self.ownership.get().owns_native()
    }

    /// Same native record, regardless of which wrapper instance
    pub fn is_same_node(&self, other: &Wrapper) -> bool {
        self.ptr == other.ptr && self.heap.same_heap(&other.heap)
    }

    /// False once the record was freed through another path
    pub fn is_live(&self) -> bool {
        self.heap.is_live(self.ptr)
    }

    // ------------------------------------------------------------------
    // Ownership transitions
    // ------------------------------------------------------------------

    /// Take over freeing the record. It must be a standalone root.
    pub fn adopt(&self) -> Result<()> {
        if self.owns_native() {
            return Ok(());
        }
        let linked = self.has_parent()? || self.declared_anywhere();
        self.heap.contract().check(
            !linked,
            "adopt",
            self.ptr,
            "cannot own a record still linked into a tree; detach it first",
        )?;
        self.ownership.set(Ownership::Owning);
        tracing::debug!(ptr = %self.ptr, "wrapper adopted its record");
        Ok(())
    }

    /// Stop freeing the record on teardown; someone else owns it now
    pub fn disown(&self) {
        if self.ownership.replace(Ownership::Borrowed).owns_native() {
            tracing::debug!(ptr = %self.ptr, "wrapper disowned its record");
        }
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Element/attribute/PI name, or the prefix of a namespace
    pub fn name(&self) -> Result<String> {
        match self.variant {
            Variant::Namespace(_) => {
                let record = self.heap.ns_record("name", self.ptr)?;
                Ok(record.prefix.unwrap_or_default())
            }
            _ => Ok(self.heap.std_record("name", self.ptr)?.name),
        }
    }

    /// Text value: content for leaves, concatenated descendant text for
    /// elements and documents, the URI for namespaces
    pub fn string_value(&self) -> Result<String> {
        if let Variant::Namespace(_) = self.variant {
            return Ok(self.heap.ns_record("string_value", self.ptr)?.href);
        }
        let record = self.heap.std_record("string_value", self.ptr)?;
        if !(self.kind == Kind::Element || self.kind.is_document()) {
            return Ok(record.content.unwrap_or_default());
        }

        let mut text = String::new();
        self.heap.arena().traverse_df(self.ptr, |_, node| {
            if node.tag == Kind::Text.tag() || node.tag == Kind::CData.tag() {
                text.push_str(node.content.as_deref().unwrap_or_default());
            }
        });
        Ok(text)
    }

    /// Parent node. For namespaces this is the shim's declaring element.
    pub fn parent(&self) -> Result<Option<NodeRef>> {
        match self.parent_ptr()? {
            Some(parent) => Ok(Some(wrap(&self.heap, parent, Ownership::Borrowed)?)),
            None => Ok(None),
        }
    }

    pub fn has_parent(&self) -> Result<bool> {
        Ok(self.parent_ptr()?.is_some())
    }

    fn parent_ptr(&self) -> Result<Option<RecordPtr>> {
        match &self.variant {
            Variant::Namespace(shim) => {
                self.heap.ns_record("parent", self.ptr)?;
                Ok(shim.get())
            }
            _ => Ok(self.heap.std_record("parent", self.ptr)?.parent),
        }
    }

    /// Borrowed wrappers for every child, in document order
    pub fn children(&self) -> Result<Vec<NodeRef>> {
        if matches!(self.variant, Variant::Namespace(_)) {
            return Ok(Vec::new());
        }
        self.heap.std_record("children", self.ptr)?;
        let children = self.heap.arena().children(self.ptr);
        children
            .into_iter()
            .map(|child| wrap(&self.heap, child, Ownership::Borrowed))
            .collect()
    }

    pub fn child_count(&self) -> Result<usize> {
        if matches!(self.variant, Variant::Namespace(_)) {
            return Ok(0);
        }
        self.heap.std_record("child_count", self.ptr)?;
        Ok(self.heap.arena().children(self.ptr).len())
    }

    /// Borrowed wrappers for the attributes of an element
    pub fn attributes(&self) -> Result<Vec<NodeRef>> {
        if self.kind != Kind::Element {
            return Ok(Vec::new());
        }
        self.heap.std_record("attributes", self.ptr)?;
        let properties = self.heap.arena().properties(self.ptr);
        properties
            .into_iter()
            .map(|attr| wrap(&self.heap, attr, Ownership::Borrowed))
            .collect()
    }

    /// Borrowed wrappers for the namespaces declared on an element; each
    /// one's shim points back at this element
    pub fn namespaces(&self) -> Result<Vec<NodeRef>> {
        if self.kind != Kind::Element {
            return Ok(Vec::new());
        }
        self.heap.std_record("namespaces", self.ptr)?;
        let ns_defs = self.heap.arena().ns_defs(self.ptr);
        ns_defs
            .into_iter()
            .map(|ns| wrap_namespace(&self.heap, ns, Some(self.ptr), Ownership::Borrowed))
            .collect()
    }

    /// Owning-document back-reference; `None` for standalone records
    pub fn document_ptr(&self) -> Result<Option<RecordPtr>> {
        match self.variant {
            Variant::Namespace(_) => Ok(self.heap.ns_record("document", self.ptr)?.context),
            _ => Ok(self.heap.std_record("document", self.ptr)?.doc),
        }
    }

    /// Borrowed wrapper for the owning document
    pub fn document(&self) -> Result<Option<NodeRef>> {
        match self.document_ptr()? {
            Some(doc) => Ok(Some(wrap(&self.heap, doc, Ownership::Borrowed)?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Namespace shim
    // ------------------------------------------------------------------

    /// Declaring element of a namespace wrapper; `None` for other variants
    pub fn namespace_parent(&self) -> Option<RecordPtr> {
        match &self.variant {
            Variant::Namespace(shim) => shim.get(),
            _ => None,
        }
    }

    /// Re-point the shim. `parent` must declare this namespace; `None` is
    /// only accepted once no element declares it.
    pub fn set_namespace_parent(&self, parent: Option<RecordPtr>) -> Result<()> {
        const OP: &str = "set_namespace_parent";
        let Variant::Namespace(shim) = &self.variant else {
            return Err(self
                .heap
                .contract()
                .violation(OP, self.ptr, "only namespace wrappers have a shim"));
        };
        if let Some(parent) = parent {
            self.heap.expect_element(OP, parent)?;
            let declared = self.heap.arena().ns_defs(parent).contains(&self.ptr);
            self.heap.contract().check(
                declared,
                OP,
                self.ptr,
                "not declared on the given element",
            )?;
        } else {
            self.heap.contract().check(
                !self.declared_anywhere(),
                OP,
                self.ptr,
                "namespace is still declared on an element",
            )?;
        }
        shim.set(parent);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structural changes
    // ------------------------------------------------------------------

    /// Detach from the parent (or declaring element). Ownership does not
    /// change: call [`adopt`] to have this wrapper free the orphaned
    /// subtree. Detaching a record that has no parent is a violation.
    ///
    /// [`adopt`]: Wrapper::adopt
    pub fn detach(&self) -> Result<()> {
        let Some((relation, parent)) = self.attachment("detach")? else {
            return Err(self
                .heap
                .contract()
                .violation("detach", self.ptr, "record is already detached"));
        };
        detach::detach(&self.heap, relation, self.ptr, parent)?;
        if let Variant::Namespace(shim) = &self.variant {
            shim.clear();
        }
        Ok(())
    }

    /// Unlink and free the record now. This wrapper stops owning it;
    /// other wrappers aliasing the record are left dangling.
    pub fn remove(&self) -> Result<()> {
        let attachment = self.attachment("remove")?;
        let Some((relation, parent)) = attachment else {
            return Err(self
                .heap
                .contract()
                .violation("remove", self.ptr, "record has no parent to be removed from"));
        };
        detach::remove(&self.heap, relation, self.ptr, parent)?;
        if let Variant::Namespace(shim) = &self.variant {
            shim.clear();
        }
        self.disown();
        Ok(())
    }

    /// Free every entry of one of this node's lists
    pub fn remove_all(&self, relation: Relation) -> Result<usize> {
        let allowed = match relation {
            Relation::Child => self.kind == Kind::Element || self.kind.is_document(),
            Relation::Attribute | Relation::Namespace => self.kind == Kind::Element,
        };
        self.heap.contract().check(
            allowed,
            "remove_all",
            self.ptr,
            &format!("a {} has no {relation:?} list", self.kind),
        )?;
        detach::remove_all(&self.heap, relation, self.ptr)
    }

    /// Append `child` to this node. The child must be a standalone root;
    /// its wrapper stops owning it since this tree's owner now does.
    pub fn append_child(&self, child: &Wrapper) -> Result<()> {
        self.check_same_heap("append_child", child)?;
        native::add_child(&self.heap, self.ptr, child.ptr)?;
        child.disown();
        Ok(())
    }

    /// Attach a standalone attribute to this element
    pub fn add_attribute(&self, attr: &Wrapper) -> Result<()> {
        self.check_same_heap("add_attribute", attr)?;
        native::add_attribute(&self.heap, self.ptr, attr.ptr)?;
        attr.disown();
        Ok(())
    }

    /// Declare a standalone namespace on this element. Returns `false`
    /// (see `Heap::last_error`) if the prefix is already declared here.
    pub fn add_namespace(&self, ns: &Wrapper) -> Result<bool> {
        const OP: &str = "add_namespace";
        self.check_same_heap(OP, ns)?;
        let Variant::Namespace(shim) = &ns.variant else {
            return Err(self
                .heap
                .contract()
                .violation(OP, ns.ptr, "expected a namespace wrapper"));
        };
        self.heap.contract().check(
            shim.get().is_none(),
            OP,
            ns.ptr,
            "namespace is still declared on an element; detach it first",
        )?;

        if !native::add_namespace(&self.heap, self.ptr, ns.ptr)? {
            return Ok(false);
        }
        shim.set(Some(self.ptr));
        ns.disown();
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Namespace resolution
    // ------------------------------------------------------------------

    /// Namespace bound to `prefix` in scope at this node
    pub fn resolve_namespace_for_prefix(&self, prefix: Option<&str>) -> Result<Option<NodeRef>> {
        let Some(element) = self.scope_element()? else {
            return Ok(None);
        };
        match resolve::namespace_for_prefix(&self.heap, element, prefix)? {
            Some((ns, declaring)) => Ok(Some(wrap_namespace(
                &self.heap,
                ns,
                Some(declaring),
                Ownership::Borrowed,
            )?)),
            None => Ok(None),
        }
    }

    /// Prefix bound to `uri` in scope at this node (`""` for the default)
    pub fn resolve_prefix_for_uri(&self, uri: &str) -> Result<Option<String>> {
        match self.scope_element()? {
            Some(element) => resolve::prefix_for_uri(&self.heap, element, uri),
            None => Ok(None),
        }
    }

    /// Element whose scope applies to this node
    fn scope_element(&self) -> Result<Option<RecordPtr>> {
        if self.kind == Kind::Element {
            return Ok(Some(self.ptr));
        }
        let parent = self.parent_ptr()?;
        Ok(parent.filter(|&ptr| {
            self.heap
                .arena()
                .std(ptr)
                .is_some_and(|record| record.tag == Kind::Element.tag())
        }))
    }

    fn attachment(&self, operation: &'static str) -> Result<Option<(Relation, RecordPtr)>> {
        let relation = match self.variant {
            Variant::Document => {
                return Err(self
                    .heap
                    .contract()
                    .violation(operation, self.ptr, "documents have no parent"))
            }
            Variant::Namespace(_) => Relation::Namespace,
            Variant::Attribute => Relation::Attribute,
            Variant::Content | Variant::Dtd => Relation::Child,
        };
        Ok(self.parent_ptr()?.map(|parent| (relation, parent)))
    }

    /// Namespace declared on some element, whatever the shim says
    fn declared_anywhere(&self) -> bool {
        matches!(self.variant, Variant::Namespace(_))
            && self.heap.arena().declaring_element(self.ptr).is_some()
    }

    fn check_same_heap(&self, operation: &'static str, other: &Wrapper) -> Result<()> {
        self.heap.contract().check(
            self.heap.same_heap(&other.heap),
            operation,
            other.ptr,
            "wrapper belongs to a different heap",
        )
    }
}

impl Drop for Wrapper {
    fn drop(&mut self) {
        if !self.owns_native() {
            return;
        }
        if std::thread::panicking() {
            tracing::warn!(ptr = %self.ptr, "skipping native release while unwinding");
            return;
        }
        let ns_parent = self.namespace_parent();
        if let Err(err) = lifetime::release(&self.heap, self.ptr, self.kind, ns_parent) {
            tracing::error!(ptr = %self.ptr, %err, "native release failed");
        }
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("ptr", &self.ptr)
            .field("kind", &self.kind)
            .field("ownership", &self.ownership.get())
            .field("namespace_parent", &self.namespace_parent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Disposition;
    use crate::heap::HeapConfig;
    use crate::types::{tag, NativeRecord, NsRecord, StdRecord};

    fn heap() -> Heap {
        Heap::with_config(HeapConfig {
            violation_policy: Disposition::Propagate,
            ..HeapConfig::default()
        })
    }

    fn element(heap: &Heap, doc: Option<RecordPtr>, name: &str) -> RecordPtr {
        native::new_element(heap, doc, name).unwrap().unwrap()
    }

    #[test]
    fn test_wrap_matches_kind() {
        let heap = heap();
        for kind in Kind::ALL {
            let record = if kind == Kind::Namespace {
                NativeRecord::Ns(NsRecord::new("urn:x", Some("x")))
            } else {
                NativeRecord::Std(StdRecord::new(kind.tag(), "n"))
            };
            let ptr = heap.arena_mut().alloc(record);
            let wrapper = if kind == Kind::Namespace {
                wrap_namespace(&heap, ptr, None, Ownership::Borrowed).unwrap()
            } else {
                wrap(&heap, ptr, Ownership::Borrowed).unwrap()
            };
            assert_eq!(wrapper.kind(), kind);

            let expected = match kind {
                Kind::Attribute => matches!(wrapper.variant(), Variant::Attribute),
                Kind::Namespace => matches!(wrapper.variant(), Variant::Namespace(_)),
                Kind::Document | Kind::HtmlDocument => {
                    matches!(wrapper.variant(), Variant::Document)
                }
                Kind::Dtd => matches!(wrapper.variant(), Variant::Dtd),
                _ => matches!(wrapper.variant(), Variant::Content),
            };
            assert!(expected, "{kind} wrapped as {:?}", wrapper.variant());
        }
    }

    #[test]
    fn test_wrap_rejects_namespace_and_bad_records() {
        let heap = heap();
        let ns = native::new_namespace(&heap, None, "urn:x", None).unwrap().unwrap();
        assert!(wrap(&heap, ns, Ownership::Borrowed).is_err());

        let entity = heap
            .arena_mut()
            .alloc(NativeRecord::Std(StdRecord::new(tag::ENTITY_REF, "amp")));
        assert!(wrap(&heap, entity, Ownership::Borrowed).is_err());

        let a = element(&heap, None, "a");
        assert!(wrap_namespace(&heap, a, None, Ownership::Borrowed).is_err());
        assert!(wrap_namespace(&heap, ns, Some(a), Ownership::Borrowed).is_err());
    }

    #[test]
    fn test_aliases_share_state_and_only_owner_frees() {
        let heap = heap();
        let r = element(&heap, None, "r");

        let a = wrap(&heap, r, Ownership::Owning).unwrap();
        let b = wrap(&heap, r, Ownership::Borrowed).unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert!(a.is_same_node(&b));

        native::set_attribute(&heap, b.ptr(), "x", "1").unwrap();
        assert_eq!(a.attributes().unwrap().len(), 1);

        drop(b);
        assert!(heap.is_live(r));
        assert_eq!(a.name().unwrap(), "r");

        drop(a);
        assert!(!heap.is_live(r));
        assert_eq!(heap.live_records(), 0);
    }

    #[test]
    fn test_owning_a_linked_record_is_rejected() {
        let heap = heap();
        let a = element(&heap, None, "a");
        let b = element(&heap, None, "b");
        native::add_child(&heap, a, b).unwrap();

        assert!(wrap(&heap, b, Ownership::Owning).is_err());
        let borrowed = wrap(&heap, b, Ownership::Borrowed).unwrap();
        assert!(borrowed.adopt().is_err());
        assert!(!borrowed.owns_native());
    }

    #[test]
    fn test_detach_then_rewrap_frees_only_subtree() {
        let heap = heap();
        let doc = native::new_document(&heap, false);
        let a = element(&heap, Some(doc), "a");
        let b = element(&heap, Some(doc), "b");
        native::add_child(&heap, doc, a).unwrap();
        native::add_child(&heap, a, b).unwrap();
        let x = native::set_attribute(&heap, b, "x", "1").unwrap().unwrap();
        let document = wrap(&heap, doc, Ownership::Owning).unwrap();

        let view = wrap(&heap, b, Ownership::Borrowed).unwrap();
        detach::detach(&heap, Relation::Child, b, a).unwrap();
        assert!(view.document_ptr().unwrap().is_none());

        let owner = wrap(&heap, b, Ownership::Owning).unwrap();
        drop(owner);

        assert!(!heap.is_live(b));
        assert!(!heap.is_live(x));
        assert!(heap.is_live(a));
        let root = wrap(&heap, a, Ownership::Borrowed).unwrap();
        assert_eq!(root.child_count().unwrap(), 0);

        // The old view is dangling now and says so
        assert!(!view.is_live());
        assert!(view.name().is_err());

        drop(root);
        drop(document);
        assert_eq!(heap.live_records(), 0);
    }

    #[test]
    fn test_namespace_shim_follows_detach() {
        let heap = heap();
        let a = element(&heap, None, "a");
        let a_wrapper = wrap(&heap, a, Ownership::Owning).unwrap();
        let ns = native::new_namespace(&heap, Some(a), "ns0", Some("p"))
            .unwrap()
            .unwrap();

        let namespaces = a_wrapper.namespaces().unwrap();
        let ns_wrapper = &namespaces[0];
        assert_eq!(ns_wrapper.namespace_parent(), Some(a));
        assert!(ns_wrapper.parent().unwrap().unwrap().is_same_node(&a_wrapper));
        assert_eq!(ns_wrapper.name().unwrap(), "p");
        assert_eq!(ns_wrapper.string_value().unwrap(), "ns0");

        ns_wrapper.detach().unwrap();
        assert_eq!(ns_wrapper.namespace_parent(), None);
        assert!(ns_wrapper.parent().unwrap().is_none());
        assert!(a_wrapper.namespaces().unwrap().is_empty());

        // Standalone now: it can be owned and freed on its own
        ns_wrapper.adopt().unwrap();
        drop(namespaces);
        assert!(!heap.is_live(ns));
        assert!(heap.is_live(a));
    }

    #[test]
    fn test_namespace_remove_clears_shim() {
        let heap = heap();
        let a = element(&heap, None, "a");
        let ns = native::new_namespace(&heap, Some(a), "urn:q", Some("q"))
            .unwrap()
            .unwrap();
        let wrapper = wrap_namespace(&heap, ns, Some(a), Ownership::Borrowed).unwrap();

        wrapper.remove().unwrap();
        assert_eq!(wrapper.namespace_parent(), None);
        assert!(!heap.is_live(ns));
        assert!(wrapper.remove().is_err());
    }

    #[test]
    fn test_set_namespace_parent_validates() {
        let heap = heap();
        let a = element(&heap, None, "a");
        let b = element(&heap, None, "b");
        let ns = native::new_namespace(&heap, Some(a), "urn:q", Some("q"))
            .unwrap()
            .unwrap();
        let wrapper = wrap_namespace(&heap, ns, None, Ownership::Borrowed).unwrap();

        assert!(wrapper.set_namespace_parent(Some(b)).is_err());
        wrapper.set_namespace_parent(Some(a)).unwrap();
        assert_eq!(wrapper.namespace_parent(), Some(a));

        let plain = wrap(&heap, a, Ownership::Borrowed).unwrap();
        assert!(plain.set_namespace_parent(None).is_err());
    }

    #[test]
    fn test_relocation_moves_ownership_into_tree() {
        let heap = heap();
        let doc = native::new_document(&heap, false);
        let document = wrap(&heap, doc, Ownership::Owning).unwrap();
        let root = wrap(&heap, element(&heap, Some(doc), "root"), Ownership::Owning).unwrap();
        document.append_child(&root).unwrap();
        assert!(!root.owns_native());

        let loose = wrap(&heap, element(&heap, None, "loose"), Ownership::Owning).unwrap();
        root.append_child(&loose).unwrap();
        assert!(!loose.owns_native());
        assert_eq!(loose.document_ptr().unwrap(), Some(doc));
        assert!(loose.parent().unwrap().unwrap().is_same_node(&root));

        // Move it: detach, adopt, relink elsewhere
        let other = wrap(&heap, element(&heap, None, "other"), Ownership::Owning).unwrap();
        loose.detach().unwrap();
        loose.adopt().unwrap();
        other.append_child(&loose).unwrap();
        assert_eq!(root.child_count().unwrap(), 0);
        assert!(loose.parent().unwrap().unwrap().is_same_node(&other));

        let loose_ptr = loose.ptr();
        drop(loose);
        assert!(heap.is_live(loose_ptr));
        drop(other);
        assert!(!heap.is_live(loose_ptr));

        drop(root);
        drop(document);
        assert_eq!(heap.live_records(), 0);
    }

    #[test]
    fn test_add_attribute_and_namespace() {
        let heap = heap();
        let target = wrap(&heap, element(&heap, None, "t"), Ownership::Owning).unwrap();
        let source = element(&heap, None, "s");
        let attr = native::set_attribute(&heap, source, "x", "1").unwrap().unwrap();
        detach::detach(&heap, Relation::Attribute, attr, source).unwrap();

        let attr = wrap(&heap, attr, Ownership::Owning).unwrap();
        target.add_attribute(&attr).unwrap();
        assert!(!attr.owns_native());
        assert!(attr.parent().unwrap().unwrap().is_same_node(&target));

        let ns = native::new_namespace(&heap, None, "urn:n", Some("n")).unwrap().unwrap();
        let ns = wrap_namespace(&heap, ns, None, Ownership::Owning).unwrap();
        assert!(target.add_namespace(&ns).unwrap());
        assert_eq!(ns.namespace_parent(), Some(target.ptr()));
        assert!(!ns.owns_native());

        let clash = native::new_namespace(&heap, None, "urn:m", Some("n")).unwrap().unwrap();
        let clash = wrap_namespace(&heap, clash, None, Ownership::Owning).unwrap();
        assert!(!target.add_namespace(&clash).unwrap());
        assert!(clash.owns_native());
        assert_eq!(clash.namespace_parent(), None);
    }

    #[test]
    fn test_remove_disowns_and_remove_all() {
        let heap = heap();
        let parent = wrap(&heap, element(&heap, None, "p"), Ownership::Owning).unwrap();
        let kid = wrap(&heap, element(&heap, None, "k"), Ownership::Owning).unwrap();
        parent.append_child(&kid).unwrap();
        kid.adopt().unwrap_err();

        kid.remove().unwrap();
        assert!(!kid.owns_native());
        assert!(!kid.is_live());

        native::set_attribute(&heap, parent.ptr(), "a", "1").unwrap();
        assert_eq!(parent.remove_all(Relation::Attribute).unwrap(), 1);
        assert_eq!(parent.remove_all(Relation::Attribute).unwrap(), 0);

        let text = wrap(&heap, native::new_text(&heap, None, "t").unwrap(), Ownership::Owning)
            .unwrap();
        assert!(text.remove_all(Relation::Attribute).is_err());
    }

    #[test]
    fn test_string_value() {
        let heap = heap();
        let a = element(&heap, None, "a");
        let b = element(&heap, None, "b");
        native::add_child(&heap, a, native::new_text(&heap, None, "one ").unwrap()).unwrap();
        native::add_child(&heap, a, b).unwrap();
        native::add_child(&heap, b, native::new_cdata(&heap, None, "two").unwrap()).unwrap();
        native::add_child(&heap, a, native::new_comment(&heap, None, "skip").unwrap()).unwrap();

        let wrapper = wrap(&heap, a, Ownership::Owning).unwrap();
        assert_eq!(wrapper.string_value().unwrap(), "one two");
        let comment = wrapper.children().unwrap().pop().unwrap();
        assert_eq!(comment.kind(), Kind::Comment);
        assert_eq!(comment.string_value().unwrap(), "skip");
    }

    #[test]
    fn test_resolution_through_shim() {
        let heap = heap();
        let a = element(&heap, None, "a");
        let b = element(&heap, None, "b");
        native::add_child(&heap, a, b).unwrap();
        native::new_namespace(&heap, Some(a), "urn:outer", Some("o")).unwrap();
        native::new_namespace(&heap, Some(b), "urn:inner", Some("i")).unwrap();
        let b_wrapper = wrap(&heap, b, Ownership::Borrowed).unwrap();

        let inner = b_wrapper.namespaces().unwrap().remove(0);
        let outer = inner.resolve_namespace_for_prefix(Some("o")).unwrap().unwrap();
        assert_eq!(outer.string_value().unwrap(), "urn:outer");
        assert_eq!(outer.namespace_parent(), Some(a));
        assert_eq!(inner.resolve_prefix_for_uri("urn:outer").unwrap().as_deref(), Some("o"));

        inner.detach().unwrap();
        assert!(inner.resolve_namespace_for_prefix(Some("o")).unwrap().is_none());
    }

    #[test]
    fn test_declared_namespace_cannot_be_owned() {
        let heap = heap();
        let a = element(&heap, None, "a");
        let p = native::new_namespace(&heap, Some(a), "urn:p", Some("p")).unwrap().unwrap();
        let q = native::new_namespace(&heap, Some(a), "urn:q", Some("q")).unwrap().unwrap();

        // No parent passed in, but `a` still declares it
        assert!(wrap_namespace(&heap, p, None, Ownership::Owning).is_err());

        let view = wrap_namespace(&heap, p, None, Ownership::Borrowed).unwrap();
        assert!(view.adopt().is_err());
        assert!(!view.owns_native());

        let declared = wrap_namespace(&heap, p, Some(a), Ownership::Borrowed).unwrap();
        assert!(declared.set_namespace_parent(None).is_err());
        assert_eq!(declared.namespace_parent(), Some(a));
        drop(view);
        drop(declared);

        assert!(heap.is_live(p));
        assert_eq!(heap.arena().ns_defs(a).as_slice(), &[p, q]);

        let owner = wrap(&heap, a, Ownership::Owning).unwrap();
        drop(owner);
        assert_eq!(heap.live_records(), 0);
    }

    #[test]
    fn test_detach_twice_is_a_violation() {
        let heap = heap();
        let a = wrap(&heap, element(&heap, None, "a"), Ownership::Owning).unwrap();
        let b = wrap(&heap, element(&heap, None, "b"), Ownership::Owning).unwrap();
        a.append_child(&b).unwrap();

        b.detach().unwrap();
        let err = b.detach().unwrap_err();
        assert!(err.as_contract().is_some());
        assert!(err.to_string().contains("already detached"));

        let ns = native::new_namespace(&heap, Some(a.ptr()), "urn:n", Some("n"))
            .unwrap()
            .unwrap();
        let ns = wrap_namespace(&heap, ns, Some(a.ptr()), Ownership::Borrowed).unwrap();
        ns.detach().unwrap();
        assert!(ns.detach().is_err());
        ns.adopt().unwrap();
    }

    #[test]
    #[should_panic(expected = "owning wrapper outlived its record")]
    fn test_double_free_is_fatal_by_default() {
        let heap = Heap::new();
        let a = native::new_element(&heap, None, "a").unwrap().unwrap();
        let b = native::new_element(&heap, None, "b").unwrap().unwrap();
        native::add_child(&heap, a, b).unwrap();

        let owner = wrap(&heap, b, Ownership::Borrowed).unwrap();
        detach::detach(&heap, Relation::Child, b, a).unwrap();
        owner.adopt().unwrap();
        let _second = wrap(&heap, b, Ownership::Owning).unwrap();
        // Dropping both owners frees `b` twice; the second release trips
        drop(owner);
    }
}
