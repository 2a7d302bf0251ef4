//! Nodes: opcode + mode + inputs + block, the unit the graph is built from
//! (spec.md §3 "Node"). Grounded on the "opcode carries a small typed
//! attribute payload, inputs held in a small vector" shape of
//! `cranelift/codegen/src/ir/dfg.rs`'s `InstructionData`, reshaped for the
//! sea-of-nodes model: here the block is input slot `-1` of *every* node
//! (spec.md I1), not an external property tracked by a separate `Layout`.

use crate::entities::{EntityId, NodeRef, TypeRef, VarId};
use crate::mode::Mode;
use smallvec::SmallVec;

use crate::opcode::Opcode;

/// Whether a node's block membership is semantically load-bearing.
///
/// `Floats` nodes may be re-blocked by code placement (spec.md §4.4);
/// `PinnedToBlock`/`ExcPinned` nodes may not. spec.md I7: `Floats` implies
/// no control-side effect and no exception.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PinState {
    PinnedToBlock,
    Floats,
    /// Pinned because it may raise an exception (e.g. a `Div` that can trap)
    /// even though it has no other control dependency; kept distinct from
    /// `PinnedToBlock` so placement diagnostics can explain *why* a node
    /// didn't float.
    ExcPinned,
}

/// Opcode-specific attributes that don't fit in `(mode, inputs)` alone.
#[derive(Clone, Debug)]
pub enum Attrs {
    None,
    Entity(EntityId),
    Type(TypeRef),
    /// An integer constant's bit pattern, stored pre-truncated to the
    /// node's mode width.
    IntConst(i64),
    FloatConst(u64),
    /// `Proj`'s index into its tuple-producing predecessor's results.
    ProjIndex(u32),
    /// Source variable a `Phi`/`Phi0` was created for by the SSA
    /// constructor (spec.md §4.3); irrelevant once construction finishes
    /// but kept for diagnostics and for `try_remove_trivial_phi`'s
    /// re-check bookkeeping.
    SsaVar(VarId),
    /// `Cmp`'s relation.
    Cmp(CmpKind),
    /// `IncSP`/`SubSP`/`AddSP`'s byte delta, and whether the result should
    /// be rounded to the target's stack alignment (spec.md §4.6).
    StackDelta { bytes: i32, align: bool },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CmpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An ordered input list. Slot `-1` (the node's block) is stored out-of-line
/// in [`Node::block`] rather than as element `0` of this vector, so that
/// "arity" below always means "number of data/memory/control inputs",
/// matching spec.md's "slots 0..arity-1" framing.
pub type Inputs = SmallVec<[NodeRef; 4]>;

/// A single IR node.
#[derive(Clone, Debug)]
pub struct Node {
    pub opcode: Opcode,
    pub mode: Mode,
    /// Slot `-1`: the block this node belongs to. Meaningless (set to a
    /// dummy self-reference) only for `Start`'s `StartBlock` itself before
    /// it is assigned; every other node always has one.
    pub block: NodeRef,
    pub inputs: Inputs,
    pub pin: PinState,
    pub attrs: Attrs,
}

impl Node {
    pub fn arity(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_block(&self) -> bool {
        self.opcode == Opcode::Block
    }

    pub fn is_floating(&self) -> bool {
        matches!(self.pin, PinState::Floats) && !self.opcode.always_pinned()
    }

    pub fn entity(&self) -> Option<EntityId> {
        match self.attrs {
            Attrs::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn ty(&self) -> Option<TypeRef> {
        match self.attrs {
            Attrs::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn int_const(&self) -> Option<i64> {
        match self.attrs {
            Attrs::IntConst(v) => Some(v),
            _ => None,
        }
    }

    pub fn proj_index(&self) -> Option<u32> {
        match self.attrs {
            Attrs::ProjIndex(i) => Some(i),
            _ => None,
        }
    }

    pub fn ssa_var(&self) -> Option<VarId> {
        match self.attrs {
            Attrs::SsaVar(v) => Some(v),
            _ => None,
        }
    }
}
