//! The closed opcode set (spec.md §3 "Node").
//!
//! Grounded on the "opcode carries typed attributes" shape of
//! `cranelift/codegen/src/ir/dfg.rs`'s `InstructionData`, but represented as
//! a flat enum rather than cranelift's format-grouped enum, since spec.md
//! lists a fixed, comparatively small opcode set rather than cranelift's
//! hundreds of target-facing instructions.

/// Every opcode the core IR knows about. Backend-introduced opcodes
/// (`IncSP`/`SubSP`/`AddSP`/`Keep`/`MemPerm`) are included since `firm-abi`
/// and `firm-regalloc` construct them through the same `Graph` API as
/// front-end opcodes — spec.md §3 says the set is closed but explicitly
/// "plus backend opcodes".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    Start,
    End,
    Block,
    Phi,
    /// A placeholder Phi inserted by the SSA constructor for an immature
    /// block (spec.md §4.3 step 2); never reachable from a `constructed`
    /// graph, always resolved by `mature_block`.
    Phi0,
    Const,
    SymConst,
    Proj,
    Add,
    Sub,
    Mul,
    Load,
    Store,
    Call,
    Return,
    Alloc,
    Free,
    Sel,
    Cmp,
    Cond,
    Jmp,
    Sync,
    Bad,
    Unknown,
    /// A removable forwarder left behind by `exchange` (spec.md §4.2):
    /// `Id(x)` simply reads as `x`; a later DCE-style pass eliminates it.
    Id,
    /// Keep-alive edges root: not itself constructed as a normal node, but
    /// listed here because `End`'s keep-alive list (spec.md I5) is modeled
    /// as ordinary `Keep`-tagged input slots rather than a separate field.
    Keep,

    // --- backend / ABI opcodes (spec.md §4.6) ---
    IncSP,
    SubSP,
    AddSP,
    /// The lowered call: inputs are SP, the target address, and
    /// register-passed arguments; results recovered via `Proj`.
    CallBe,
    MemPerm,

    // --- backend / register-allocator opcodes (spec.md §4.5) ---
    /// Belady spiller output: store a value to its spill slot (spec.md
    /// §4.5.4's "emit a spill"). Not present in the front-end-facing closed
    /// set; constructed only by `firm-regalloc`.
    Spill,
    /// Belady spiller output: reload a spilled value back into a register
    /// (spec.md §4.5.4's "emit a reload").
    Reload,
    /// A register-to-register move inserted by copy-coalescing fix-up or by
    /// the spill-slot coalescer's edge fix-up (spec.md §4.5.3/§4.5.5);
    /// also the vehicle for affinity edges copy-coalescing tries to
    /// eliminate.
    Copy,
}

impl Opcode {
    /// Control-flow operators and anything with mode `X` are never floated
    /// by placement (spec.md §4.4 edge cases).
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            Opcode::Start
                | Opcode::End
                | Opcode::Block
                | Opcode::Jmp
                | Opcode::Cond
                | Opcode::Return
        )
    }

    /// Opcodes that are always pinned to their block regardless of the
    /// node's declared pin state (control-flow, and anything with a
    /// visible side effect or exception).
    pub fn always_pinned(self) -> bool {
        self.is_control_flow()
            || matches!(
                self,
                Opcode::Call
                    | Opcode::Store
                    | Opcode::Load
                    | Opcode::Alloc
                    | Opcode::Free
                    | Opcode::Phi
                    | Opcode::Phi0
                    | Opcode::Start
                    | Opcode::End
                    | Opcode::IncSP
                    | Opcode::SubSP
                    | Opcode::AddSP
                    | Opcode::CallBe
                    | Opcode::MemPerm
                    | Opcode::Spill
                    | Opcode::Reload
                    | Opcode::Copy
            )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
