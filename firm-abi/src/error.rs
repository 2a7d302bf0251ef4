//! Errors raised by ABI lowering (spec.md §7).

use firm_ir::NodeRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Covers both `firm-ir`'s own construction errors and `firm-ssa`'s
    /// (the SSA builder reports through `firm_ir::Error` directly, having
    /// no error type of its own).
    #[error(transparent)]
    Ir(#[from] firm_ir::Error),

    #[error(transparent)]
    Analysis(#[from] firm_analysis::Error),

    /// An `Alloc`/`Free` handed to [`crate::stack_alloc`] had a non-constant
    /// size. `IncSP`/`SubSP`/`AddSP` carry a compile-time-constant byte
    /// delta (spec.md §4.6), so a dynamically-sized allocation (a VLA-style
    /// alloca) cannot be lowered through them; this core has no SP-adjust
    /// opcode that takes a value operand.
    #[error("stack allocation at {node} has a non-constant size")]
    NonConstantAllocSize { node: NodeRef },

    /// The stack-bias propagation walk found two predecessors of the same
    /// block disagreeing on the SP bias at block entry (spec.md §4.6's
    /// "bias at a block's end ... must equal the bias at the successor's
    /// start" invariant).
    #[error("unbalanced stack bias entering block {block}: {a} vs {b}")]
    UnbalancedBias { block: NodeRef, a: i32, b: i32 },
}
