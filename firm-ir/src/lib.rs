//! C2: the IR graph model — nodes, modes, types/entities, the graph's
//! construction and mutation API, and structural invariant checking
//! (spec.md §3, §4.2).

pub mod entities;
pub mod error;
pub mod graph;
pub mod invariants;
pub mod mode;
pub mod node;
pub mod opcode;
pub mod types;

pub use entities::{EntityId, NodeRef, TypeRef, VarId};
pub use error::Error;
pub use graph::{ConstructionState, Graph};
pub use mode::{Mode, ModeKind};
pub use node::{Attrs, CmpKind, Node, PinState};
pub use opcode::Opcode;
pub use types::{Entity, Linkage, Member, Signature, Type, TypeGraph, TypeKind, Visibility};

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_type_graph() -> (TypeGraph, TypeRef, EntityId) {
        let mut tg = TypeGraph::new();
        let frame = tg.new_type(TypeKind::Frame {
            members: vec![],
            size: 0,
            align: 8,
        });
        let sig = tg.new_type(TypeKind::Method(Signature {
            params: vec![],
            results: vec![Mode::I32],
        }));
        let owner = tg.new_type(TypeKind::Aggregate {
            members: vec![],
            size: 0,
            align: 1,
        });
        let entity = tg.new_entity("f", owner, sig, Linkage::Local, Visibility::Public);
        (tg, frame, entity)
    }

    #[test]
    fn new_graph_has_one_start_and_end() {
        let (_tg, frame, entity) = simple_type_graph();
        let g = Graph::new_graph(entity, frame, 1);
        assert_eq!(g.node(g.start).opcode, Opcode::Start);
        assert_eq!(g.node(g.end).opcode, Opcode::End);
        assert!(g.is_matured(g.start_block));
    }

    #[test]
    fn value_numbering_dedups_identical_consts() {
        let (_tg, frame, entity) = simple_type_graph();
        let mut g = Graph::new_graph(entity, frame, 0);
        let c1 = g.new_const(g.start_block, Mode::I32, 7).unwrap();
        let c2 = g.new_const(g.start_block, Mode::I32, 7).unwrap();
        assert_eq!(c1, c2, "identical constants should intern to one node");
        let c3 = g.new_const(g.start_block, Mode::I32, 8).unwrap();
        assert_ne!(c1, c3);
    }

    #[test]
    fn value_numbering_dedups_identical_adds() {
        // Seed scenario 1: two Adds with identical constant inputs in the
        // same graph intern to a single node.
        let (_tg, frame, entity) = simple_type_graph();
        let mut g = Graph::new_graph(entity, frame, 0);
        let one = g.new_const(g.start_block, Mode::I32, 1).unwrap();
        let two = g.new_const(g.start_block, Mode::I32, 2).unwrap();
        let add1 = g.new_add(g.start_block, one, two).unwrap();
        let add2 = g.new_add(g.start_block, one, two).unwrap();
        assert_eq!(add1, add2);
    }

    #[test]
    fn mode_mismatch_is_rejected() {
        let (_tg, frame, entity) = simple_type_graph();
        let mut g = Graph::new_graph(entity, frame, 0);
        let i32c = g.new_const(g.start_block, Mode::I32, 1).unwrap();
        let i64c = g.new_const(g.start_block, Mode::I64, 1).unwrap();
        assert!(g.new_add(g.start_block, i32c, i64c).is_err());
    }

    #[test]
    fn exchange_is_noop_on_self() {
        let (_tg, frame, entity) = simple_type_graph();
        let mut g = Graph::new_graph(entity, frame, 0);
        let c = g.new_const(g.start_block, Mode::I32, 3).unwrap();
        g.exchange(c, c);
        assert_eq!(g.node(c).opcode, Opcode::Const);
    }

    #[test]
    fn exchange_redirects_all_users() {
        let (_tg, frame, entity) = simple_type_graph();
        let mut g = Graph::new_graph(entity, frame, 0);
        let one = g.new_const(g.start_block, Mode::I32, 1).unwrap();
        let two = g.new_const(g.start_block, Mode::I32, 2).unwrap();
        let add = g.new_add(g.start_block, one, two).unwrap();
        let replacement = g.new_const(g.start_block, Mode::I32, 3).unwrap();
        g.exchange(add, replacement);
        assert_eq!(g.node(add).opcode, Opcode::Bad);
    }

    #[test]
    fn finalize_construction_checks_invariants() {
        let (_tg, frame, entity) = simple_type_graph();
        let mut g = Graph::new_graph(entity, frame, 0);
        let zero = g.new_const(g.start_block, Mode::I32, 0).unwrap();
        // Build a trivial memory token via Proj over Start for the return.
        let start_tuple = g.start;
        let mem_tok = g.new_proj(g.start_block, Mode::M, start_tuple, 0).unwrap();
        g.new_return(g.start_block, mem_tok, &[zero]).unwrap();
        assert!(g.finalize_construction().is_ok());
    }
}
