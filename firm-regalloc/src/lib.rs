//! C5: register allocation (spec.md §4.5) — liveness, interference graphs,
//! MST-style copy coalescing and coloring, Belady spilling, and spill-slot
//! coalescing. Run once per register class, in that order, over a graph
//! whose values have already been placed by `firm-analysis::place`.

pub mod coalesce;
pub mod error;
pub mod interference;
pub mod liveness;
pub mod reg;
pub mod spill;
pub mod spill_coalesce;

pub use coalesce::{coalesce_and_color, BlockFrequency, Coloring, Config};
pub use error::Error;
pub use interference::InterferenceGraph;
pub use liveness::Liveness;
pub use reg::{Register, RegisterClass, SaveKind};
pub use spill::{spill, SpillResult};
pub use spill_coalesce::{coalesce_spill_slots, SpillSlots};

use firm_analysis::LoopTree;
use firm_ir::Graph;

/// Runs the full per-class pipeline (spec.md §4.5): liveness, Belady
/// spilling (materialized into the graph), re-derived liveness over the
/// now-spilled graph, interference, spill-slot coalescing, and finally
/// copy-coalescing/coloring. Returns the value→register coloring and the
/// spill-slot assignment; the caller still owns wiring `Coloring` into
/// whatever output representation the backend that follows expects.
pub fn allocate(
    graph: &mut Graph,
    class: &RegisterClass,
    loops: &LoopTree,
    freq: &dyn BlockFrequency,
    remat: impl Fn(firm_ir::NodeRef) -> bool,
    config: Config,
) -> Result<(Coloring, SpillSlots), Error> {
    let pre_liveness = Liveness::compute(graph, class)?;
    let spill_result = spill::spill(graph, class, &pre_liveness, loops, remat);
    spill_result.materialize(graph)?;

    let liveness = Liveness::compute(graph, class)?;
    let slots = spill_coalesce::coalesce_spill_slots(graph, &liveness, &spill_result);

    let interference = InterferenceGraph::compute(graph, class, &liveness);
    let values: Vec<firm_ir::NodeRef> = graph.node_refs().filter(|&n| reg_in_class(graph, n, class)).collect();
    let coloring = coalesce_and_color(graph, class, &interference, freq, &values, config)?;

    log::debug!(
        "allocate[{}]: {} spills, {} slots, {} colored values",
        class.name,
        spill_result.spill_count(),
        slots.slot_count(),
        values.len()
    );
    Ok((coloring, slots))
}

fn reg_in_class(graph: &Graph, n: firm_ir::NodeRef, class: &RegisterClass) -> bool {
    let mode = graph.node(n).mode;
    if !mode.is_data() || mode.is_memory() {
        return false;
    }
    match class.name {
        "fp" => matches!(mode.kind, firm_ir::ModeKind::Float),
        _ => !matches!(mode.kind, firm_ir::ModeKind::Float),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firm_analysis::DominatorTree;
    use firm_ir::{EntityId, Linkage, Mode, Signature, TypeGraph, TypeKind, Visibility};

    struct UniformFreq;
    impl BlockFrequency for UniformFreq {
        fn frequency(&self, _block: firm_ir::NodeRef) -> f64 {
            1.0
        }
    }

    fn new_graph() -> (TypeGraph, Graph) {
        let mut tg = TypeGraph::new();
        let frame = tg.new_type(TypeKind::Frame { members: vec![], size: 0, align: 8 });
        let owner = tg.new_type(TypeKind::Aggregate { members: vec![], size: 0, align: 1 });
        let sig = tg.new_type(TypeKind::Method(Signature { params: vec![], results: vec![] }));
        let entity: EntityId = tg.new_entity("f", owner, sig, Linkage::Local, Visibility::Public);
        (tg, Graph::new_graph(entity, frame, 0))
    }

    fn gp_class(n: u32) -> RegisterClass {
        RegisterClass::new(
            "gp",
            (0..n).map(|i| Register { index: i, name: "r", save_kind: SaveKind::CallerSave }).collect(),
        )
    }

    #[test]
    fn allocate_without_pressure_needs_no_spills() {
        let (_tg, mut g) = new_graph();
        let a = g.new_const(g.start_block, Mode::I32, 1).unwrap();
        let b = g.new_const(g.start_block, Mode::I32, 2).unwrap();
        let sum = g.new_add(g.start_block, a, b).unwrap();
        let mem = g.new_proj(g.start_block, Mode::M, g.start, 0).unwrap();
        g.new_return(g.start_block, mem, &[sum]).unwrap();
        g.finalize_construction().unwrap();

        let class = gp_class(4);
        let doms = DominatorTree::compute(&mut g).unwrap();
        let loops = LoopTree::compute(&mut g, &doms).unwrap();

        let (coloring, slots) = allocate(&mut g, &class, &loops, &UniformFreq, |_| false, Config::default()).unwrap();
        assert_eq!(slots.slot_count(), 0);
        assert!(coloring.color_of(a).is_some());
        assert!(coloring.color_of(b).is_some());
        assert_ne!(coloring.color_of(a), coloring.color_of(b));
    }
}
