//! Record kind classification
//!
//! Shared-layout records and namespace records are read through separate
//! paths; the two layouts are never unified.

use crate::error::Result;
use crate::heap::Heap;
use crate::types::{tag, Kind, NativeRecord, RecordPtr};

enum Probe {
    Known(Kind),
    Unsupported(u8),
    Stale,
}

/// Determine which variant `ptr` refers to.
///
/// A stale address or an unsupported tag means memory corruption or a
/// record kind from upstream this crate was never taught; both go to the
/// contract hook.
pub fn classify(heap: &Heap, ptr: RecordPtr) -> Result<Kind> {
    let probe = match heap.arena().get(ptr) {
        None => Probe::Stale,
        Some(NativeRecord::Ns(record)) => classify_namespace(record.tag),
        Some(NativeRecord::Std(record)) => classify_std(record.tag),
    };

    match probe {
        Probe::Known(kind) => Ok(kind),
        Probe::Unsupported(raw) => Err(heap.contract().violation(
            "classify",
            ptr,
            &format!("unsupported record tag {raw}"),
        )),
        Probe::Stale => Err(heap.contract().violation(
            "classify",
            ptr,
            "address does not refer to a live record",
        )),
    }
}

fn classify_namespace(raw: u8) -> Probe {
    if raw == tag::NAMESPACE_DECL {
        Probe::Known(Kind::Namespace)
    } else {
        Probe::Unsupported(raw)
    }
}

fn classify_std(raw: u8) -> Probe {
    match Kind::from_tag(raw) {
        // A namespace tag on the shared layout is a corrupt record
        Some(Kind::Namespace) | None => Probe::Unsupported(raw),
        Some(kind) => Probe::Known(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Disposition;
    use crate::heap::HeapConfig;
    use crate::types::{NsRecord, StdRecord};

    fn propagating_heap() -> Heap {
        Heap::with_config(HeapConfig {
            violation_policy: Disposition::Propagate,
            ..HeapConfig::default()
        })
    }

    fn alloc(heap: &Heap, record: NativeRecord) -> RecordPtr {
        heap.arena_mut().alloc(record)
    }

    #[test]
    fn test_every_kind_classifies() {
        let heap = propagating_heap();
        for kind in Kind::ALL {
            let record = if kind == Kind::Namespace {
                NativeRecord::Ns(NsRecord::new("urn:x", None))
            } else {
                NativeRecord::Std(StdRecord::new(kind.tag(), "n"))
            };
            let ptr = alloc(&heap, record);
            assert_eq!(classify(&heap, ptr).unwrap(), kind);
        }
    }

    #[test]
    fn test_unsupported_tag_is_a_violation() {
        let heap = propagating_heap();
        let ptr = alloc(
            &heap,
            NativeRecord::Std(StdRecord::new(tag::ENTITY_REF, "amp")),
        );
        let err = classify(&heap, ptr).unwrap_err();
        assert_eq!(err.as_contract().unwrap().operation, "classify");
        assert!(err.to_string().contains("unsupported record tag 5"));
    }

    #[test]
    fn test_namespace_tag_on_wrong_layout() {
        let heap = propagating_heap();
        let ptr = alloc(
            &heap,
            NativeRecord::Std(StdRecord::new(tag::NAMESPACE_DECL, "ns")),
        );
        assert!(classify(&heap, ptr).is_err());

        let mut odd = NsRecord::new("urn:x", None);
        odd.tag = tag::ELEMENT;
        let ptr = alloc(&heap, NativeRecord::Ns(odd));
        assert!(classify(&heap, ptr).is_err());
    }

    #[test]
    #[should_panic(expected = "address does not refer to a live record")]
    fn test_stale_address_is_fatal_by_default() {
        let heap = Heap::new();
        let ptr = alloc(&heap, NativeRecord::Std(StdRecord::new(tag::TEXT, "t")));
        heap.arena_mut().free(ptr);
        let _ = classify(&heap, ptr);
    }
}
