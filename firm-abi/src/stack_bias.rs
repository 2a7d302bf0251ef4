//! Stack-bias propagation (spec.md §4.6 "Stack-bias propagation").
//!
//! "A data-flow walk across blocks tracking the SP offset at each
//! instruction... invariant: bias at a block's end as seen along every CFG
//! out-edge must equal the bias at the successor's start." No teacher
//! analogue (cranelift tracks this implicitly through its `Layout`'s fixed
//! instruction order and per-ISA prologue/epilogue insertion, not as a
//! standalone dataflow pass); written in this workspace's own invariant-
//! checking idiom (`firm-ir::invariants`'s one-function-per-rule, `Vec`
//! accumulation style), generalized from a dominance walk to a full CFG
//! worklist since bias must be checked at every merge, not just inherited
//! from one immediate dominator.

use firm_analysis::ControlFlowGraph;
use firm_ir::{Graph, NodeRef};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use crate::error::Error;

/// Per-block net byte delta contributed by that block's own chain of
/// `IncSP`/`SubSP`/`AddSP` nodes (positive: grows downward/shrinks SP;
/// the caller picks the sign convention and must apply it consistently —
/// `crate::stack_alloc`'s `SubSP`/`AddSP` pair nets to zero across a
/// balanced alloc/free, which is exactly what this pass checks for).
pub type BlockDeltas = FxHashMap<NodeRef, i32>;

/// Walks the CFG from `entry` breadth-first, accumulating `deltas` into a
/// bias-at-entry map, and fails with [`Error::UnbalancedBias`] the first
/// time two predecessors of the same block disagree.
pub fn propagate(graph: &Graph, entry: NodeRef, deltas: &BlockDeltas) -> Result<FxHashMap<NodeRef, i32>, Error> {
    let cfg = ControlFlowGraph::compute(graph);
    let mut bias_entry: FxHashMap<NodeRef, i32> = FxHashMap::default();
    bias_entry.insert(entry, 0);

    let mut queue: VecDeque<NodeRef> = VecDeque::new();
    queue.push_back(entry);
    let mut visited = rustc_hash::FxHashSet::default();
    visited.insert(entry);

    while let Some(block) = queue.pop_front() {
        let entry_bias = bias_entry[&block];
        let exit_bias = entry_bias + deltas.get(&block).copied().unwrap_or(0);
        for &succ in cfg.succs(block) {
            match bias_entry.get(&succ) {
                Some(&existing) if existing != exit_bias => {
                    return Err(Error::UnbalancedBias {
                        block: succ,
                        a: existing,
                        b: exit_bias,
                    });
                }
                Some(_) => {}
                None => {
                    bias_entry.insert(succ, exit_bias);
                }
            }
            if visited.insert(succ) {
                queue.push_back(succ);
            }
        }
    }

    log::debug!("stack_bias: propagated entry bias for {} blocks", bias_entry.len());
    Ok(bias_entry)
}

/// `entity_offset - initial_offset + current_bias` (spec.md §4.6): the
/// address a frame-entity reference should use once the bias at its block
/// is known.
pub fn biased_offset(entity_offset: i32, initial_offset: i32, current_bias: i32) -> i32 {
    entity_offset - initial_offset + current_bias
}

#[cfg(test)]
mod tests {
    use super::*;
    use firm_ir::{EntityId, Linkage, Signature, TypeGraph, TypeKind, Visibility};

    fn new_graph() -> (TypeGraph, Graph) {
        let mut tg = TypeGraph::new();
        let frame = tg.new_type(TypeKind::Frame { members: vec![], size: 0, align: 8 });
        let owner = tg.new_type(TypeKind::Aggregate { members: vec![], size: 0, align: 1 });
        let sig = tg.new_type(TypeKind::Method(Signature { params: vec![], results: vec![] }));
        let entity: EntityId = tg.new_entity("f", owner, sig, Linkage::Local, Visibility::Public);
        (tg, Graph::new_graph(entity, frame, 0))
    }

    #[test]
    fn bias_accumulates_along_a_straight_chain() {
        let (_tg, mut g) = new_graph();
        let jmp = g.new_jmp(g.start_block).unwrap();
        let next = g.new_block(&[jmp]).unwrap();
        g.mature_block(next).unwrap();
        g.new_jmp(next).unwrap();

        let mut deltas = BlockDeltas::default();
        deltas.insert(g.start_block, -16);
        deltas.insert(next, 16);

        let bias = propagate(&g, g.start_block, &deltas).unwrap();
        assert_eq!(bias[&g.start_block], 0);
        assert_eq!(bias[&next], -16);
    }

    #[test]
    fn disagreeing_predecessors_are_rejected() {
        let (_tg, mut g) = new_graph();
        let selector = g.new_const(g.start_block, firm_ir::Mode::I1, 1).unwrap();
        let cond = g.new_cond(g.start_block, selector).unwrap();
        let true_edge = g.new_proj(g.start_block, firm_ir::Mode::X, cond, 0).unwrap();
        let false_edge = g.new_proj(g.start_block, firm_ir::Mode::X, cond, 1).unwrap();
        let left = g.new_block(&[true_edge]).unwrap();
        let right = g.new_block(&[false_edge]).unwrap();
        g.mature_block(left).unwrap();
        g.mature_block(right).unwrap();
        let left_jmp = g.new_jmp(left).unwrap();
        let right_jmp = g.new_jmp(right).unwrap();

        let join = g.new_block(&[left_jmp, right_jmp]).unwrap();
        g.mature_block(join).unwrap();

        let mut deltas = BlockDeltas::default();
        deltas.insert(left, -16);
        deltas.insert(right, -8);

        let err = propagate(&g, g.start_block, &deltas).unwrap_err();
        assert!(matches!(err, Error::UnbalancedBias { .. }));
    }
}
