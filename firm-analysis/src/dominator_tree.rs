//! Dominator / post-dominator trees (spec.md §3, §4.4), computed with the
//! Lengauer-Tarjan algorithm.
//!
//! Grounded on the "small `Copy` handle per block, `PackedOption` for
//! idom, lazily recomputed behind `assure_*`" shape of
//! `cranelift/codegen/src/dominator_tree/simple.rs`'s `SimpleDominatorTree`;
//! that file uses Cooper/Harvey/Kennedy's iterative algorithm rather than
//! Lengauer-Tarjan, so the O(n) semidominator/bucket bookkeeping below
//! (`ancestor`/`label`/path compression) has no direct teacher analogue and
//! is written from the algorithm's own structure instead.

use firm_entity::{PackedOption, Resource, SecondaryMap};
use firm_ir::{Graph, NodeRef};
use std::collections::{HashMap, HashSet};

use crate::cfg::ControlFlowGraph;
use crate::error::Error;

#[derive(Clone, Default)]
struct DomNode {
    idom: PackedOption<NodeRef>,
    depth: u32,
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Reverse,
}

/// The dominator tree of one direction of a graph's CFG: forward (rooted at
/// `start_block`, spec.md's "Dominator tree") or reverse (rooted at
/// `end_block`, spec.md's "Post-dominator tree").
pub struct DominatorTree {
    nodes: SecondaryMap<NodeRef, DomNode>,
    reachable: firm_entity::EntitySet<NodeRef>,
    /// CFG post-order of reachable blocks, as produced by the algorithm's
    /// own initial DFS. Exposed for callers that want a traversal order
    /// consistent with the tree, mirroring the teacher's `cfg_postorder()`.
    postorder: Vec<NodeRef>,
}

impl DominatorTree {
    pub fn is_reachable(&self, block: NodeRef) -> bool {
        self.reachable.contains(block)
    }

    pub fn idom(&self, block: NodeRef) -> Option<NodeRef> {
        self.nodes.get(block).idom.expand()
    }

    /// Depth of `block` in the dominator tree; the root is depth 0.
    pub fn depth(&self, block: NodeRef) -> u32 {
        self.nodes.get(block).depth
    }

    pub fn postorder(&self) -> &[NodeRef] {
        &self.postorder
    }

    /// Does `a` dominate `b`? A block dominates itself.
    pub fn dominates(&self, a: NodeRef, b: NodeRef) -> bool {
        if a == b {
            return true;
        }
        if !self.is_reachable(b) {
            return false;
        }
        let mut cur = b;
        while let Some(idom) = self.idom(cur) {
            if idom == a {
                return true;
            }
            cur = idom;
        }
        false
    }

    /// The deepest block dominating both `a` and `b`. Both must be
    /// reachable.
    pub fn common_dominator(&self, a: NodeRef, b: NodeRef) -> NodeRef {
        let mut ancestors = HashSet::new();
        let mut cur = a;
        ancestors.insert(cur);
        while let Some(idom) = self.idom(cur) {
            ancestors.insert(idom);
            cur = idom;
        }
        let mut cur = b;
        loop {
            if ancestors.contains(&cur) {
                return cur;
            }
            cur = self
                .idom(cur)
                .expect("unreachable block passed to common_dominator");
        }
    }

    /// `assure_doms(graph)`: the dominator tree of the forward CFG rooted
    /// at the start block.
    pub fn compute(graph: &mut Graph) -> Result<Self, Error> {
        graph.resources_mut().lock(Resource::Dominance)?;
        let cfg = ControlFlowGraph::compute(graph);
        let result = Self::compute_over(graph.start_block, &cfg, Direction::Forward);
        graph.resources_mut().unlock(Resource::Dominance)?;
        log::debug!("assure_doms: {} reachable blocks", result.reachable_count());
        Ok(result)
    }

    /// `assure_postdoms(graph)`: the dominator tree of the reverse CFG
    /// rooted at the end block.
    pub fn compute_post(graph: &mut Graph) -> Result<Self, Error> {
        graph.resources_mut().lock(Resource::PostDominance)?;
        let cfg = ControlFlowGraph::compute(graph);
        let result = Self::compute_over(graph.end_block, &cfg, Direction::Reverse);
        graph.resources_mut().unlock(Resource::PostDominance)?;
        log::debug!(
            "assure_postdoms: {} reachable blocks",
            result.reachable_count()
        );
        Ok(result)
    }

    fn reachable_count(&self) -> usize {
        self.postorder.len()
    }

    fn compute_over(entry: NodeRef, cfg: &ControlFlowGraph, dir: Direction) -> Self {
        let succ_of = |b: NodeRef| -> Vec<NodeRef> {
            match dir {
                Direction::Forward => cfg.succs(b).to_vec(),
                Direction::Reverse => cfg.preds(b).to_vec(),
            }
        };
        let pred_of = |b: NodeRef| -> Vec<NodeRef> {
            match dir {
                Direction::Forward => cfg.preds(b).to_vec(),
                Direction::Reverse => cfg.succs(b).to_vec(),
            }
        };

        // --- Lengauer-Tarjan ---
        //
        // Vertices are numbered 1..=n in DFS preorder; index 0 is an
        // unused sentinel meaning "no vertex" / "unset".
        let mut vertex: Vec<NodeRef> = vec![entry]; // vertex[0] unused
        let mut dfnum: HashMap<NodeRef, usize> = HashMap::new();
        let mut parent: Vec<usize> = vec![0];
        let mut block_of = HashMap::new();

        // Iterative DFS so deep CFGs don't blow the call stack.
        let mut stack = vec![entry];
        dfnum.insert(entry, 1);
        vertex.push(entry);
        block_of.insert(1usize, entry);
        parent.push(0);
        while let Some(&v) = stack.last() {
            let mut advanced = false;
            for w in succ_of(v) {
                if !dfnum.contains_key(&w) {
                    let i = vertex.len();
                    dfnum.insert(w, i);
                    vertex.push(w);
                    block_of.insert(i, w);
                    parent.push(dfnum[&v]);
                    stack.push(w);
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                stack.pop();
            }
        }

        let n = dfnum.len();
        let mut semi: Vec<usize> = (0..=n).collect();
        let mut label: Vec<usize> = (0..=n).collect();
        let mut ancestor: Vec<usize> = vec![0; n + 1];
        let mut idom: Vec<usize> = vec![0; n + 1];
        let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); n + 1];

        fn compress(v: usize, ancestor: &mut [usize], label: &mut [usize], semi: &[usize]) {
            let a = ancestor[v];
            if ancestor[a] != 0 {
                compress(a, ancestor, label, semi);
                if semi[label[a]] < semi[label[v]] {
                    label[v] = label[a];
                }
                ancestor[v] = ancestor[a];
            }
        }

        fn eval(v: usize, ancestor: &mut [usize], label: &mut [usize], semi: &[usize]) -> usize {
            if ancestor[v] == 0 {
                v
            } else {
                compress(v, ancestor, label, semi);
                label[v]
            }
        }

        let dfn_of = |b: NodeRef| -> usize { *dfnum.get(&b).unwrap_or(&0) };

        for i in (2..=n).rev() {
            let w = i;
            let w_block = block_of[&w];
            for v_block in pred_of(w_block) {
                let v = dfn_of(v_block);
                if v == 0 {
                    continue; // predecessor unreachable from entry
                }
                let u = eval(v, &mut ancestor, &mut label, &semi);
                if semi[u] < semi[w] {
                    semi[w] = semi[u];
                }
            }
            bucket[semi[w]].push(w);
            ancestor[w] = parent[w];

            let pw = parent[w];
            let bucket_pw = std::mem::take(&mut bucket[pw]);
            for v in bucket_pw {
                let u = eval(v, &mut ancestor, &mut label, &semi);
                idom[v] = if semi[u] < semi[v] { u } else { pw };
            }
        }
        for i in 2..=n {
            if idom[i] != semi[i] {
                idom[i] = idom[idom[i]];
            }
        }
        idom[1] = 0;

        let mut nodes = SecondaryMap::new();
        let mut reachable = firm_entity::EntitySet::new();
        for i in 1..=n {
            let b = block_of[&i];
            reachable.insert(b);
            let idom_block = if idom[i] == 0 {
                None
            } else {
                Some(block_of[&idom[i]])
            };
            nodes.ensure_set(b).idom = idom_block.into();
        }
        // Depths via a single pass in DFS preorder: a node's immediate
        // dominator always has a strictly smaller dfnum, so processing
        // 1..=n in order always sees a block's idom before the block
        // itself.
        for i in 1..=n {
            let b = block_of[&i];
            let d = match nodes.get(b).idom.expand() {
                Some(p) => nodes.get(p).depth + 1,
                None => 0,
            };
            nodes.ensure_set(b).depth = d;
        }

        let mut postorder = Vec::with_capacity(n);
        let mut seen = HashSet::new();
        fn post_visit(
            b: NodeRef,
            succ_of: &impl Fn(NodeRef) -> Vec<NodeRef>,
            seen: &mut HashSet<NodeRef>,
            out: &mut Vec<NodeRef>,
        ) {
            if !seen.insert(b) {
                return;
            }
            for s in succ_of(b) {
                post_visit(s, succ_of, seen, out);
            }
            out.push(b);
        }
        post_visit(entry, &succ_of, &mut seen, &mut postorder);

        Self {
            nodes,
            reachable,
            postorder,
        }
    }
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
    fn diamond_join_is_dominated_by_entry_not_by_either_arm() {
        let (_tg, mut g) = new_graph();
        let left = g.new_block(&[]).unwrap();
        let right = g.new_block(&[]).unwrap();
        let entry_jmp = g.new_jmp(g.start_block).unwrap();
        g.add_pred(left, entry_jmp).unwrap();
        g.mature_block(left).unwrap();
        let entry_jmp2 = g.new_jmp(g.start_block).unwrap();
        g.add_pred(right, entry_jmp2).unwrap();
        g.mature_block(right).unwrap();
        let left_jmp = g.new_jmp(left).unwrap();
        let right_jmp = g.new_jmp(right).unwrap();
        let join = g.new_block(&[left_jmp, right_jmp]).unwrap();
        g.mature_block(join).unwrap();

        let doms = DominatorTree::compute(&mut g).unwrap();
        assert_eq!(doms.idom(join), Some(g.start_block));
        assert_eq!(doms.idom(left), Some(g.start_block));
        assert!(doms.dominates(g.start_block, join));
        assert!(!doms.dominates(left, join));
        assert!(!doms.dominates(right, join));
        assert_eq!(doms.common_dominator(left, right), g.start_block);
    }

    #[test]
    fn straight_line_chain_has_linear_depths() {
        let (_tg, mut g) = new_graph();
        let jmp1 = g.new_jmp(g.start_block).unwrap();
        let b1 = g.new_block(&[jmp1]).unwrap();
        g.mature_block(b1).unwrap();
        let jmp2 = g.new_jmp(b1).unwrap();
        let b2 = g.new_block(&[jmp2]).unwrap();
        g.mature_block(b2).unwrap();

        let doms = DominatorTree::compute(&mut g).unwrap();
        assert_eq!(doms.depth(g.start_block), 0);
        assert_eq!(doms.depth(b1), 1);
        assert_eq!(doms.depth(b2), 2);
        assert!(doms.dominates(g.start_block, b2));
        assert!(doms.dominates(b1, b2));
    }

    #[test]
    fn unreachable_block_is_not_reachable() {
        let (_tg, mut g) = new_graph();
        // A block nobody ever jumps to and that is matured with zero preds.
        let orphan = g.new_block(&[]).unwrap();
        g.mature_block(orphan).unwrap();

        let doms = DominatorTree::compute(&mut g).unwrap();
        assert!(!doms.is_reachable(orphan));
        assert!(doms.is_reachable(g.start_block));
    }
}
