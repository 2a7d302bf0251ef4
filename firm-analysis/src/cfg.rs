//! The block-level control-flow graph, derived from a [`Graph`]'s own
//! block-predecessor edges (spec.md I1/I2: a Block's inputs are the
//! control-flow producers of its predecessors).
//!
//! Grounded on `cranelift/codegen/src/flowgraph.rs`'s `ControlFlowGraph`,
//! which likewise recomputes a predecessor/successor view from the
//! function's own layout rather than storing it on the IR permanently;
//! reshaped here since sea-of-nodes blocks carry their own predecessor list
//! already (no separate `Layout` to walk).

use firm_entity::SecondaryMap;
use firm_ir::{Graph, NodeRef, Opcode};

/// A snapshot of predecessor/successor block lists. Recomputed on demand;
/// nothing invalidates it automatically, matching `assure_*`'s "first call
/// computes, recompute when asked again" contract at the placement-pass
/// level (the CFG itself isn't behind its own resource lock — it's a cheap
/// derived view, not a cached analysis).
pub struct ControlFlowGraph {
    preds: SecondaryMap<NodeRef, Vec<NodeRef>>,
    succs: SecondaryMap<NodeRef, Vec<NodeRef>>,
}

impl ControlFlowGraph {
    pub fn compute(graph: &Graph) -> Self {
        let mut preds = SecondaryMap::new();
        let mut succs = SecondaryMap::new();
        for b in graph.node_refs() {
            if !graph.node(b).is_block() {
                continue;
            }
            // `ensure_set` so every block gets a (possibly empty) row, even
            // one with zero successors (a block no one jumps to yet).
            succs.ensure_set(b);
            let mut pb = Vec::new();
            for &p in &graph.node(b).inputs {
                if graph.node(p).opcode == Opcode::Bad {
                    continue;
                }
                let pred_block = graph.node(p).block;
                pb.push(pred_block);
                succs.ensure_set(pred_block).push(b);
            }
            *preds.ensure_set(b) = pb;
        }
        Self { preds, succs }
    }

    pub fn preds(&self, b: NodeRef) -> &[NodeRef] {
        self.preds.get(b)
    }

    pub fn succs(&self, b: NodeRef) -> &[NodeRef] {
        self.succs.get(b)
    }
}
