//! Umbrella crate: re-exports the public surface of `firm-entity`,
//! `firm-ir`, `firm-ssa`, `firm-analysis`, and (behind their own feature
//! flags, on by default) `firm-regalloc`/`firm-abi`, mirroring the
//! teacher's `cranelift`/`cranelift-umbrella` crate — one dependency for a
//! driver that wants the whole pipeline rather than picking individual
//! sub-crates off the workspace.

pub use firm_analysis::{place, ControlFlowGraph, DominatorTree, LoopTree};
pub use firm_entity::{Arena, EntityRef, PrimaryMap, Resource, ResourceLocks};
pub use firm_ir::{
    Attrs, CmpKind, ConstructionState, Entity, EntityId, Error, Graph, Linkage, Member, Mode, ModeKind, Node, NodeRef,
    Opcode, PinState, Signature, Type, TypeGraph, TypeKind, TypeRef, VarId, Visibility,
};
pub use firm_ssa::SsaBuilder;

#[cfg(feature = "regalloc")]
pub use firm_regalloc as regalloc;

#[cfg(feature = "abi")]
pub use firm_abi as abi;
