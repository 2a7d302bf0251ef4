//! C1: the arena, entity-reference, and identity layer underlying the IR.
//!
//! Everything in this crate is paradigm-agnostic — it has no notion of
//! "node" or "block", only of arena-owned entities addressed by small
//! integer indices. `firm-ir` builds the actual graph model on top of it.

pub mod arena;
pub mod entity_ref;
pub mod error;
pub mod primary_map;
pub mod resource_lock;
pub mod secondary_map;
pub mod value_table;

pub use arena::Arena;
pub use entity_ref::{EntityRef, PackedOption};
pub use primary_map::PrimaryMap;
pub use resource_lock::{Resource, ResourceLocks};
pub use secondary_map::{EntitySet, SecondaryMap};
pub use value_table::{CtxEq, CtxHash, ValueTable};
pub use visit::VisitCounter;

pub mod visit;
