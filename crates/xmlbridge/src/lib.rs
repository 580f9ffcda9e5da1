//! XML Node Ownership Bridge
//!
//! Reference-counted wrappers over a manually managed, pointer-linked
//! XML tree.
//!
//! ## Rules
//!
//! - **One owner frees**: only a wrapper holding `Ownership::Owning` releases native memory
//! - **Detach before relocate**: links are cleared before a record moves or is freed
//! - **No silent corruption**: stale addresses and broken preconditions go to the contract hook
//! - **Namespaces have no parent**: the wrapper's shim says where they are declared
//!
//! ## Core Design
//!
//! ```text
//! native::new_* → RecordPtr ──wrap()──→ Rc<Wrapper> (Owning | Borrowed)
//!                    │                        │
//!                    ↓                        ↓ Drop
//!              NativeArena  ←── detach / remove / strip ── lifetime::release
//!                    ↑
//!          Heap { arena, ErrorChannel, ContractAssertions }
//! ```

pub mod arena;
pub mod classify;
pub mod contract;
pub mod detach;
pub mod error;
pub mod heap;
pub mod invalidate;
pub mod lifetime;
pub mod native;
pub mod resolve;
pub mod shim;
pub mod types;
pub mod wrapper;

pub use classify::classify;
pub use contract::{ContractViolation, Disposition};
pub use detach::Relation;
pub use error::{ErrorChannel, ErrorDomain, NativeError, Result, XmlError};
pub use heap::{Heap, HeapConfig};
pub use invalidate::strip_document_pointers;
pub use lifetime::Ownership;
pub use types::{Kind, RecordPtr};
pub use wrapper::{wrap, wrap_namespace, NodeRef, Variant, Wrapper};
