//! Click's Global Code Motion (spec.md §4.4 "Code placement"): every
//! `Floats` node is pinned to the dominance-optimal block by a schedule-early
//! pass (deepest block that still dominates every input), then pulled back
//! up out of loops by a schedule-late pass (shallowest-loop-depth block
//! between the early placement and the least common ancestor of all uses).
//!
//! No teacher analogue (cranelift never floats instructions; its IR is
//! pinned to a layout from construction) — grounded directly in Click &
//! Cooper's algorithm, using the same `SecondaryMap` memoization shape as
//! `dominator_tree.rs`/`loop_tree.rs` for the per-node early/late caches.

use firm_entity::{PackedOption, SecondaryMap};
use firm_ir::{Graph, NodeRef, Opcode};

use crate::dominator_tree::DominatorTree;
use crate::loop_tree::LoopTree;

/// Runs schedule-early then schedule-late over every floating node reachable
/// from `End`, reassigning each node's block in place via `set_input(n, -1,
/// ..)`. Pinned nodes (spec.md I7: control flow, anything with a side effect
/// or that may except) are left untouched.
pub fn place(graph: &mut Graph, doms: &DominatorTree, loops: &LoopTree) {
    let floating: Vec<NodeRef> = graph
        .node_refs()
        .filter(|&n| graph.node(n).is_floating())
        .collect();

    let mut early: SecondaryMap<NodeRef, PackedOption<NodeRef>> = SecondaryMap::new();
    for &n in &floating {
        place_early(graph, n, doms, &mut early);
    }

    let mut late: SecondaryMap<NodeRef, PackedOption<NodeRef>> = SecondaryMap::new();
    for &n in &floating {
        place_late(graph, n, doms, loops, &early, &mut late);
    }

    for &n in &floating {
        let target = late.get(n).expand().expect("place_late left a node unset");
        if graph.node(n).block != target {
            graph.set_input(n, -1, target);
        }
    }
}

/// The deepest block (in the dominator tree) that dominates every input of
/// `n`. Memoized; `n`'s own entry is filled before returning.
fn place_early(
    graph: &Graph,
    n: NodeRef,
    doms: &DominatorTree,
    memo: &mut SecondaryMap<NodeRef, PackedOption<NodeRef>>,
) -> NodeRef {
    if let Some(b) = memo.get(n).expand() {
        return b;
    }
    let inputs = &graph.node(n).inputs;
    let mut best = graph.start_block;
    for &inp in inputs {
        let inp_node = graph.node(inp);
        if inp_node.opcode == Opcode::Bad {
            continue;
        }
        let inp_block = if inp_node.is_floating() {
            place_early(graph, inp, doms, memo)
        } else {
            inp_node.block
        };
        if doms.depth(inp_block) > doms.depth(best) {
            best = inp_block;
        }
    }
    *memo.ensure_set(n) = Some(best).into();
    best
}

/// The shallowest-loop-depth block between `n`'s early placement and the
/// least common dominator ancestor of all its uses. Memoized, and recurses
/// into floating users first since their own late placement can move the
/// use site further than their nominal block.
fn place_late(
    graph: &Graph,
    n: NodeRef,
    doms: &DominatorTree,
    loops: &LoopTree,
    early: &SecondaryMap<NodeRef, PackedOption<NodeRef>>,
    memo: &mut SecondaryMap<NodeRef, PackedOption<NodeRef>>,
) -> NodeRef {
    if let Some(b) = memo.get(n).expand() {
        return b;
    }
    let early_block = early.get(n).expand().expect("place_early ran first");

    let mut lca: Option<NodeRef> = None;
    for &(user, slot) in graph.uses_of(n) {
        if slot < -1 {
            // a keep-alive edge: End must dominate any placement anyway,
            // so it never tightens the LCA.
            continue;
        }
        let user_node = graph.node(user);
        let use_block = if user_node.opcode == Opcode::Phi {
            // the value must be live at the end of the predecessor block
            // feeding this Phi input, not at the Phi's own block.
            let phi_block_inputs = &graph.node(user_node.block).inputs;
            let pred_ctrl = phi_block_inputs[slot as usize];
            graph.node(pred_ctrl).block
        } else if user_node.is_floating() {
            place_late(graph, user, doms, loops, early, memo)
        } else {
            user_node.block
        };
        lca = Some(match lca {
            Some(acc) => doms.common_dominator(acc, use_block),
            None => use_block,
        });
    }

    // A node with no remaining uses (dead code not yet swept) has nowhere
    // it must live; leave it at its earliest legal position.
    let lca = lca.unwrap_or(early_block);

    let mut best = lca;
    let mut best_depth = loops.loop_depth(lca);
    let mut cur = lca;
    while cur != early_block {
        cur = doms
            .idom(cur)
            .expect("early_block must dominate every use's LCA");
        let d = loops.loop_depth(cur);
        if d < best_depth {
            best = cur;
            best_depth = d;
        }
    }

    *memo.ensure_set(n) = Some(best).into();
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use firm_ir::{EntityId, Linkage, Mode, Signature, TypeGraph, TypeKind, Visibility};

    fn new_graph() -> (TypeGraph, Graph) {
        let mut tg = TypeGraph::new();
        let frame = tg.new_type(TypeKind::Frame {
            members: vec![],
            size: 0,
            align: 8,
        });
        let owner = tg.new_type(TypeKind::Aggregate {
            members: vec![],
            size: 0,
            align: 1,
        });
        let sig = tg.new_type(TypeKind::Method(Signature {
            params: vec![],
            results: vec![],
        }));
        let entity: EntityId = tg.new_entity("f", owner, sig, Linkage::Local, Visibility::Public);
        (tg, Graph::new_graph(entity, frame, 0))
    }

    #[test]
    fn loop_invariant_add_is_hoisted_out_of_the_loop() {
        let (_tg, mut g) = new_graph();
        let entry_jmp = g.new_jmp(g.start_block).unwrap();
        let header = g.new_block(&[entry_jmp]).unwrap();
        let back_edge = g.new_jmp(header).unwrap();
        g.add_pred(header, back_edge).unwrap();
        g.mature_block(header).unwrap();

        // a + b is computed in the start block (both operands available
        // there) but only used inside the loop header.
        let a = g.new_const(g.start_block, Mode::I32, 10).unwrap();
        let b = g.new_const(g.start_block, Mode::I32, 20).unwrap();
        let sum = g.new_add(header, a, b).unwrap();
        assert_eq!(g.node(sum).block, header);

        let mem = g.new_proj(g.start_block, Mode::M, g.start, 0).unwrap();
        g.new_return(header, mem, &[sum]).unwrap();

        let doms = DominatorTree::compute(&mut g).unwrap();
        let loops = LoopTree::compute(&mut g, &doms).unwrap();
        place(&mut g, &doms, &loops);

        // the add has no loop-carried dependency, so it should end up
        // outside the loop, in the (zero-depth) start block.
        assert_eq!(g.node(sum).block, g.start_block);
    }

    #[test]
    fn value_used_only_by_a_phi_is_placed_in_the_feeding_predecessor() {
        let (_tg, mut g) = new_graph();
        let left = g.new_block(&[]).unwrap();
        let right = g.new_block(&[]).unwrap();
        let entry_jmp = g.new_jmp(g.start_block).unwrap();
        g.add_pred(left, entry_jmp).unwrap();
        g.mature_block(left).unwrap();
        let entry_jmp2 = g.new_jmp(g.start_block).unwrap();
        g.add_pred(right, entry_jmp2).unwrap();
        g.mature_block(right).unwrap();

        let ten = g.new_const(g.start_block, Mode::I32, 10).unwrap();
        assert_eq!(g.node(ten).block, g.start_block);
        let twenty = g.new_const(g.start_block, Mode::I32, 20).unwrap();

        let left_jmp = g.new_jmp(left).unwrap();
        let right_jmp = g.new_jmp(right).unwrap();
        let join = g.new_block(&[left_jmp, right_jmp]).unwrap();
        g.mature_block(join).unwrap();
        let phi = g.new_phi(join, Mode::I32, &[ten, twenty]).unwrap();
        let mem = g.new_proj(g.start_block, Mode::M, g.start, 0).unwrap();
        g.new_return(join, mem, &[phi]).unwrap();

        let doms = DominatorTree::compute(&mut g).unwrap();
        let loops = LoopTree::compute(&mut g, &doms).unwrap();
        place(&mut g, &doms, &loops);

        // both consts only feed the Phi, one per predecessor slot, so each
        // should be scheduled into its own feeding predecessor block.
        assert_eq!(g.node(ten).block, left);
        assert_eq!(g.node(twenty).block, right);
    }
}
