//! SSA fixup for SP (spec.md §4.6: "after ABI lowering duplicates the SP,
//! an SSA-construction pass (§4.3) is invoked over all SP-producing nodes
//! to insert SP-Phis where needed").
//!
//! Call/alloc/free lowering each produce a *new* SP value local to the
//! block they run in, but the node they feed (the next `IncSP`/`SubSP`/
//! `AddSP`/`CallBe` downstream, possibly in a different block) was built
//! against whatever SP value existed before lowering. This module re-runs
//! `firm-ssa`'s on-demand construction treating "the current SP" as a
//! single tracked variable, so merges get real Phis instead of a stale
//! single-definition edge. Grounded directly on `firm-ssa::SsaBuilder`'s
//! own `get_value`/`set_value`/`mature_block` surface and its
//! `ssa_cons_start`/`ssa_cons_finish` re-construction bracket, used exactly
//! as `firm-ssa`'s own module doc says the backend's re-SSA case should.

use firm_entity::EntityRef;
use firm_ir::{Graph, Mode, NodeRef, VarId};
use firm_ssa::SsaBuilder;

use crate::error::Error;

/// One block's chain of SP-producing nodes in the order they execute,
/// each still wired to whatever placeholder SP value it was built with.
/// [`fixup_sp`] rewrites input slot 0 of every node in the chain to the
/// real predecessor-derived value and threads `current` through it.
pub type SpChains = rustc_hash::FxHashMap<NodeRef, Vec<NodeRef>>;

/// Reconstructs SSA for the stack pointer: binds `initial_sp` at `entry`,
/// then for every block rewrites its `chains` entry (if any) to consume
/// the block's inherited SP value (inserting Phis at merges on demand),
/// and finally records the block's own last SP value so successors can
/// inherit it.
pub fn fixup_sp(graph: &mut Graph, entry: NodeRef, initial_sp: NodeRef, chains: &SpChains) -> Result<(), Error> {
    let sp_var = VarId::new(0);
    let mut ssa = SsaBuilder::new();
    ssa.ssa_cons_start(graph, 1);
    ssa.set_value(graph, entry, sp_var, initial_sp)?;

    let mut blocks: Vec<NodeRef> = graph.node_refs().filter(|&n| graph.node(n).is_block()).collect();
    blocks.sort();

    for &block in &blocks {
        let mut current = ssa.get_value(graph, block, sp_var, Mode::P)?;
        if let Some(chain) = chains.get(&block) {
            for &node in chain {
                graph.set_input(node, 0, current);
                current = node;
            }
        }
        ssa.set_value(graph, block, sp_var, current)?;
    }
    for &block in &blocks {
        ssa.mature_block(graph, block)?;
    }

    ssa.ssa_cons_finish(graph)?;
    log::debug!("ssa_fixup: re-threaded SP across {} blocks", blocks.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use firm_ir::{EntityId, Linkage, Opcode, Signature, TypeGraph, TypeKind, Visibility};

    fn new_graph() -> (TypeGraph, Graph) {
        let mut tg = TypeGraph::new();
        let frame = tg.new_type(TypeKind::Frame { members: vec![], size: 0, align: 8 });
        let owner = tg.new_type(TypeKind::Aggregate { members: vec![], size: 0, align: 1 });
        let sig = tg.new_type(TypeKind::Method(Signature { params: vec![], results: vec![] }));
        let entity: EntityId = tg.new_entity("f", owner, sig, Linkage::Local, Visibility::Public);
        (tg, Graph::new_graph(entity, frame, 0))
    }

    #[test]
    fn diamond_merge_gets_an_sp_phi() {
        let (_tg, mut g) = new_graph();
        let sp0 = g.new_const(g.start_block, Mode::P, 0).unwrap();

        let selector = g.new_const(g.start_block, Mode::I1, 1).unwrap();
        let cond = g.new_cond(g.start_block, selector).unwrap();
        let true_edge = g.new_proj(g.start_block, Mode::X, cond, 0).unwrap();
        let false_edge = g.new_proj(g.start_block, Mode::X, cond, 1).unwrap();
        let left = g.new_block(&[true_edge]).unwrap();
        let right = g.new_block(&[false_edge]).unwrap();
        g.mature_block(left).unwrap();
        g.mature_block(right).unwrap();

        // Each arm adjusts SP by its own constant delta, both fed by a
        // placeholder that `fixup_sp` must replace.
        let placeholder = g.unknown(Mode::P);
        let left_sub = g.new_sub_sp(left, placeholder, 16, false).unwrap();
        let right_sub = g.new_sub_sp(right, placeholder, 16, false).unwrap();
        let left_jmp = g.new_jmp(left).unwrap();
        let right_jmp = g.new_jmp(right).unwrap();
        let join = g.new_block(&[left_jmp, right_jmp]).unwrap();
        g.mature_block(join).unwrap();

        let mut chains = SpChains::default();
        chains.insert(left, vec![left_sub]);
        chains.insert(right, vec![right_sub]);

        fixup_sp(&mut g, g.start_block, sp0, &chains).unwrap();

        assert_eq!(g.node(left_sub).inputs[0], sp0);
        assert_eq!(g.node(right_sub).inputs[0], sp0);
        for n in g.node_refs() {
            assert_ne!(g.node(n).opcode, Opcode::Phi0);
        }
    }
}
