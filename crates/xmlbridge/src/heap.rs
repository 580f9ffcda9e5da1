//! Heap - shared handle to native memory
//!
//! One `Heap` stands in for the native library's process state: the record
//! arena, the last-error slot and the contract hook. It is `Rc`-based, so a
//! heap and every wrapper pointing into it stay on the thread that built them.

use crate::arena::NativeArena;
use crate::contract::{ContractAssertions, Disposition};
use crate::error::{ErrorChannel, NativeError, Result};
use crate::types::{Kind, NsRecord, RecordPtr, StdRecord};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// Configuration for a heap
#[derive(Debug, Clone)]
pub struct HeapConfig {
    pub initial_capacity: usize,
    /// What a contract violation does when no hook is installed
    pub violation_policy: Disposition,
    /// Give detached subtrees their own copies of namespace declarations
    /// they reference from outside
    pub reconcile_namespaces_on_detach: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            violation_policy: Disposition::Abort,
            reconcile_namespaces_on_detach: true,
        }
    }
}

struct HeapInner {
    config: HeapConfig,
    arena: RefCell<NativeArena>,
    errors: ErrorChannel,
    contract: ContractAssertions,
}

/// Cloneable handle; clones share the same native memory
#[derive(Clone)]
pub struct Heap {
    inner: Rc<HeapInner>,
}

impl Heap {
    /// Create a heap with default config
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Create a heap with custom config
    pub fn with_config(config: HeapConfig) -> Self {
        let inner = HeapInner {
            arena: RefCell::new(NativeArena::with_capacity(config.initial_capacity)),
            errors: ErrorChannel::new(),
            contract: ContractAssertions::new(config.violation_policy),
            config,
        };
        Self {
            inner: Rc::new(inner),
        }
    }

    pub fn config(&self) -> &HeapConfig {
        &self.inner.config
    }

    /// Read-only view of native memory for the duration of `f`. Do not
    /// call back into mutating operations (or drop owning wrappers) from
    /// inside `f`.
    pub fn with_arena<R>(&self, f: impl FnOnce(&NativeArena) -> R) -> R {
        f(&self.inner.arena.borrow())
    }

    pub(crate) fn arena(&self) -> Ref<'_, NativeArena> {
        self.inner.arena.borrow()
    }

    pub(crate) fn arena_mut(&self) -> RefMut<'_, NativeArena> {
        self.inner.arena.borrow_mut()
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.inner.errors
    }

    /// Most recent native failure, if any was ever recorded
    pub fn last_error(&self) -> Option<NativeError> {
        self.inner.errors.last_error()
    }

    pub fn contract(&self) -> &ContractAssertions {
        &self.inner.contract
    }

    pub fn is_live(&self, ptr: RecordPtr) -> bool {
        self.arena().is_live(ptr)
    }

    /// Number of records currently allocated
    pub fn live_records(&self) -> usize {
        self.arena().len()
    }

    /// Do both handles point at the same native memory
    pub fn same_heap(&self, other: &Heap) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy of a shared-layout record, or a violation if `ptr` is stale or
    /// points at a namespace
    pub fn std_record(&self, operation: &'static str, ptr: RecordPtr) -> Result<StdRecord> {
        let record = self.arena().std(ptr).cloned();
        record.ok_or_else(|| {
            self.contract()
                .violation(operation, ptr, "expected a live shared-layout record")
        })
    }

    /// Copy of a namespace record, or a violation
    pub fn ns_record(&self, operation: &'static str, ptr: RecordPtr) -> Result<NsRecord> {
        let record = self.arena().ns(ptr).cloned();
        record.ok_or_else(|| {
            self.contract()
                .violation(operation, ptr, "expected a live namespace record")
        })
    }

    /// Violation unless `ptr` is a live element
    pub fn expect_element(&self, operation: &'static str, ptr: RecordPtr) -> Result<StdRecord> {
        let record = self.std_record(operation, ptr)?;
        self.contract().check(
            record.tag == Kind::Element.tag(),
            operation,
            ptr,
            "expected an element",
        )?;
        Ok(record)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("live_records", &self.live_records())
            .field("config", &self.inner.config)
            .finish()
    }
}
