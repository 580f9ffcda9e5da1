//! Slot arena holding every native record
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<Slot>
//!        [gen|record][gen|record][gen|None]...
//!         ↑ RecordPtr = (index, generation)
//! ```
//!
//! Allocation and freeing are manual. Nothing here knows about trees:
//! freeing a record never touches the records it links to. A freed slot
//! bumps its generation and goes on the free list, so stale addresses
//! resolve to `None` instead of to the slot's next tenant.

use crate::types::{NativeRecord, NsRecord, RecordPtr, StdRecord};
use smallvec::SmallVec;

/// Short snapshot of a linked list
pub type PtrList = SmallVec<[RecordPtr; 8]>;

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<NativeRecord>,
}

/// Manually managed record storage
#[derive(Debug)]
pub struct NativeArena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
}

impl NativeArena {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Store a record, returns its address
    pub fn alloc(&mut self, record: NativeRecord) -> RecordPtr {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return RecordPtr::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        RecordPtr::new(index, 0)
    }

    /// Release one record. Returns `None` for a stale address.
    pub fn free(&mut self, ptr: RecordPtr) -> Option<NativeRecord> {
        let slot = self.slots.get_mut(ptr.index() as usize)?;
        if slot.generation != ptr.generation() {
            return None;
        }
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(ptr.index());
        self.live -= 1;
        Some(record)
    }

    pub fn get(&self, ptr: RecordPtr) -> Option<&NativeRecord> {
        self.slots
            .get(ptr.index() as usize)
            .filter(|slot| slot.generation == ptr.generation())
            .and_then(|slot| slot.record.as_ref())
    }

    pub fn get_mut(&mut self, ptr: RecordPtr) -> Option<&mut NativeRecord> {
        self.slots
            .get_mut(ptr.index() as usize)
            .filter(|slot| slot.generation == ptr.generation())
            .and_then(|slot| slot.record.as_mut())
    }

    pub fn std(&self, ptr: RecordPtr) -> Option<&StdRecord> {
        self.get(ptr).and_then(NativeRecord::as_std)
    }

    pub fn std_mut(&mut self, ptr: RecordPtr) -> Option<&mut StdRecord> {
        self.get_mut(ptr).and_then(NativeRecord::as_std_mut)
    }

    pub fn ns(&self, ptr: RecordPtr) -> Option<&NsRecord> {
        self.get(ptr).and_then(NativeRecord::as_ns)
    }

    pub fn ns_mut(&mut self, ptr: RecordPtr) -> Option<&mut NsRecord> {
        self.get_mut(ptr).and_then(NativeRecord::as_ns_mut)
    }

    pub fn is_live(&self, ptr: RecordPtr) -> bool {
        self.get(ptr).is_some()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Follow `next` links of shared-layout records starting at `first`
    pub fn siblings(&self, first: Option<RecordPtr>) -> PtrList {
        let mut out = PtrList::new();
        let mut cursor = first;
        while let Some(ptr) = cursor {
            out.push(ptr);
            cursor = self.std(ptr).and_then(|record| record.next);
        }
        out
    }

    /// Follow `next` links of namespace records starting at `first`
    pub fn ns_chain(&self, first: Option<RecordPtr>) -> PtrList {
        let mut out = PtrList::new();
        let mut cursor = first;
        while let Some(ptr) = cursor {
            out.push(ptr);
            cursor = self.ns(ptr).and_then(|record| record.next);
        }
        out
    }

    /// Children of a shared-layout record, in document order
    pub fn children(&self, ptr: RecordPtr) -> PtrList {
        self.siblings(self.std(ptr).and_then(|record| record.children))
    }

    /// Attributes of an element, in declaration order
    pub fn properties(&self, ptr: RecordPtr) -> PtrList {
        self.siblings(self.std(ptr).and_then(|record| record.properties))
    }

    /// Namespace declarations of an element, in declaration order
    pub fn ns_defs(&self, ptr: RecordPtr) -> PtrList {
        self.ns_chain(self.std(ptr).and_then(|record| record.ns_def))
    }

    /// Element whose declaration list holds `ns`. Namespace records carry
    /// no parent link, so this scans every live record.
    pub fn declaring_element(&self, ns: RecordPtr) -> Option<RecordPtr> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            let record = slot.record.as_ref()?.as_std()?;
            let listed = self.ns_chain(record.ns_def).contains(&ns);
            listed.then(|| RecordPtr::new(index as u32, slot.generation))
        })
    }

    /// Traverse the `children` tree depth-first (iterative, no recursion).
    ///
    /// Only shared-layout records are visited; attributes and namespace
    /// declarations hang off the visited records and are left to the caller.
    pub fn traverse_df<F>(&self, start: RecordPtr, mut visit: F)
    where
        F: FnMut(RecordPtr, &StdRecord),
    {
        let mut stack = vec![start];

        while let Some(ptr) = stack.pop() {
            let Some(record) = self.std(ptr) else {
                continue;
            };
            visit(ptr, record);

            // Push children in reverse order (so they're visited left-to-right)
            for child in self.siblings(record.children).into_iter().rev() {
                stack.push(child);
            }
        }
    }

    /// Addresses of `start` and every descendant, depth-first
    pub fn subtree(&self, start: RecordPtr) -> Vec<RecordPtr> {
        let mut out = Vec::new();
        self.traverse_df(start, |ptr, _| out.push(ptr));
        out
    }
}

impl Default for NativeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tag;

    fn element(name: &str) -> NativeRecord {
        NativeRecord::Std(StdRecord::new(tag::ELEMENT, name))
    }

    #[test]
    fn test_alloc_and_get() {
        let mut arena = NativeArena::new();
        let ptr = arena.alloc(element("div"));

        assert_eq!(arena.len(), 1);
        assert_eq!(arena.std(ptr).unwrap().name, "div");
        assert!(arena.ns(ptr).is_none());
    }

    #[test]
    fn test_stale_pointer_does_not_resolve() {
        let mut arena = NativeArena::new();
        let old = arena.alloc(element("a"));
        assert!(arena.free(old).is_some());

        let reused = arena.alloc(element("b"));
        assert_eq!(reused.index(), old.index());
        assert_ne!(reused.generation(), old.generation());

        assert!(arena.get(old).is_none());
        assert!(arena.free(old).is_none());
        assert_eq!(arena.std(reused).unwrap().name, "b");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_traverse_df() {
        let mut arena = NativeArena::new();

        // Create tree: root -> [child1, child2]
        let root = arena.alloc(element("div"));
        let child1 = arena.alloc(element("span"));
        let child2 = arena.alloc(element("p"));

        {
            let record = arena.std_mut(root).unwrap();
            record.children = Some(child1);
            record.last = Some(child2);
        }
        arena.std_mut(child1).unwrap().next = Some(child2);
        arena.std_mut(child2).unwrap().prev = Some(child1);

        let mut visited = Vec::new();
        arena.traverse_df(root, |_, record| visited.push(record.name.clone()));

        assert_eq!(visited, vec!["div", "span", "p"]);
        assert_eq!(arena.children(root).as_slice(), &[child1, child2]);
    }

    #[test]
    fn test_declaring_element() {
        let mut arena = NativeArena::new();
        let owner = arena.alloc(element("a"));
        let first = arena.alloc(NativeRecord::Ns(NsRecord::new("urn:p", Some("p"))));
        let second = arena.alloc(NativeRecord::Ns(NsRecord::new("urn:q", Some("q"))));
        let loose = arena.alloc(NativeRecord::Ns(NsRecord::new("urn:r", Some("r"))));
        arena.std_mut(owner).unwrap().ns_def = Some(first);
        arena.ns_mut(first).unwrap().next = Some(second);

        assert_eq!(arena.declaring_element(first), Some(owner));
        assert_eq!(arena.declaring_element(second), Some(owner));
        assert_eq!(arena.declaring_element(loose), None);

        arena.free(owner);
        assert_eq!(arena.declaring_element(second), None);
    }
}
