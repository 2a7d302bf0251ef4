//! Dominance, loop structure, and code placement (spec.md §4.4): the
//! analyses that sit between SSA construction (`firm-ssa`) and register
//! allocation (`firm-regalloc`).
//!
//! Grounded on `cranelift-codegen`'s split between a standalone dominator
//! tree module and a separate loop-analysis module, each recomputed on
//! demand from the function rather than kept permanently in sync; reshaped
//! here behind this workspace's own `ResourceLocks` (`firm-entity`) rather
//! than cranelift's ad hoc "invalidate on next `compute`" convention, since
//! spec.md ties these analyses to the IR's own resource-lock discipline.

mod cfg;
mod dominator_tree;
mod error;
mod loop_tree;
mod placement;

pub use cfg::ControlFlowGraph;
pub use dominator_tree::DominatorTree;
pub use error::Error;
pub use loop_tree::LoopTree;
pub use placement::place;
