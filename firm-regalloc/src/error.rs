//! Errors raised by the register allocator (spec.md §7).

use firm_ir::NodeRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Resource(#[from] firm_entity::resource_lock::Error),

    #[error(transparent)]
    Analysis(#[from] firm_analysis::Error),

    #[error(transparent)]
    Ir(#[from] firm_ir::Error),

    /// A value needed a register that was simultaneously required by an
    /// interfering neighbor and no admissible color existed for either
    /// (spec.md §4.5.3/§7): the allocator gives up rather than producing an
    /// unsound coloring.
    #[error("node {node:?} has no admissible register in class {class}")]
    ConstraintUnsatisfiable { node: NodeRef, class: &'static str },
}
