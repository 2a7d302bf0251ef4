//! Errors raised by graph construction and mutation (spec.md §7).

use crate::entities::NodeRef;
use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Invariant {
    I1BlockInput,
    I2BlockPredsAreControl,
    I3PhiArityMatchesBlock,
    I4ModeMismatch,
    I5EndInputsAreReturnsOrBad,
    I6OneStartOneEnd,
    I7FloatsImpliesNoSideEffect,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invariant {which:?} violated at {node}")]
    InvariantViolation { which: Invariant, node: NodeRef },

    #[error("mode mismatch in {op} slot {slot}: expected {expected}, got {actual}")]
    ModeMismatch {
        op: &'static str,
        slot: usize,
        expected: crate::mode::Mode,
        actual: crate::mode::Mode,
    },

    #[error("construction-only operation called outside a building phase")]
    NotBuilding,

    #[error("block {0} is not yet matured")]
    BlockNotMatured(NodeRef),

    #[error("block {0} is already matured")]
    BlockAlreadyMatured(NodeRef),
}
