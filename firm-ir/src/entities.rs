//! Entity references used throughout the IR: one `u32`-wrapping newtype per
//! kind of thing a node can point at. Grounded on
//! `cranelift/codegen/src/ir/entities.rs`'s `Block(u32)`/`Value(u32)`
//! pattern and its `entity_impl!` macro, reused here via `firm-entity`.

use firm_entity::entity_impl;

/// A reference to a node in some graph's arena. Slot `-1` of any non-Block
/// node is a `NodeRef` naming the `Block` it belongs to (spec.md I1); a
/// `Block`'s own inputs (slot `-1` excepted, blocks have none) are the
/// control-producing `NodeRef`s of its predecessors (spec.md I2).
///
/// Blocks are themselves just nodes with opcode `Block` — there is no
/// separate `Block` entity kind, matching spec.md's "blocks are first-class
/// nodes" framing. A `NodeRef` known to hold a `Block` node is still typed as
/// plain `NodeRef`; callers that want the distinction use
/// `Node::is_block()`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(u32);
entity_impl!(NodeRef, "n");

/// A reference to a [`crate::types::Type`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(u32);
entity_impl!(TypeRef, "ty");

/// A reference to a [`crate::types::Entity`] (field, local, parameter, or
/// procedure). Entities have stable numeric identity independent of layout
/// (spec.md §3 "Type / Entity").
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);
entity_impl!(EntityId, "ent");

/// A logical local-variable id used by the SSA constructor's
/// `get_value`/`set_value` discipline (spec.md §4.3). Not an IR entity in
/// its own right — it never appears as a node input — but kept as a typed
/// newtype rather than a bare `u32` to avoid mixing it up with `NodeRef`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct VarId(u32);
entity_impl!(VarId, "var");
