//! End-to-end pipeline tests exercising the full sequence a driver would
//! run through the umbrella crate: SSA construction, dominance/loop
//! analysis, placement, register allocation, and ABI lowering together in
//! one graph. Each per-crate unit test suite already covers its own seed
//! scenario in isolation (spec.md §8); these instead check the crates
//! compose the way `firm-regalloc::allocate` and `firm-abi`'s own doc
//! comments claim they do.

use firm::abi::{lower_call, lower_stack_alloc, SimpleAssigner};
use firm::regalloc::{self, BlockFrequency, Config, Register, RegisterClass, SaveKind};
use firm::{
    DominatorTree, EntityId, EntityRef, Graph, Linkage, LoopTree, Mode, Opcode, Signature, SsaBuilder, TypeGraph, TypeKind,
    VarId, Visibility,
};

fn new_graph() -> (TypeGraph, Graph) {
    let mut tg = TypeGraph::new();
    let frame = tg.new_type(TypeKind::Frame { members: vec![], size: 0, align: 8 });
    let owner = tg.new_type(TypeKind::Aggregate { members: vec![], size: 0, align: 1 });
    let sig = tg.new_type(TypeKind::Method(Signature { params: vec![], results: vec![] }));
    let entity: EntityId = tg.new_entity("f", owner, sig, Linkage::Local, Visibility::Public);
    (tg, Graph::new_graph(entity, frame, 0))
}

struct UniformFreq;
impl BlockFrequency for UniformFreq {
    fn frequency(&self, _block: firm::NodeRef) -> f64 {
        1.0
    }
}

fn gp_class(n: u32) -> RegisterClass {
    RegisterClass::new(
        "gp",
        (0..n).map(|i| Register { index: i, name: "r", save_kind: SaveKind::CallerSave }).collect(),
    )
}

/// A diamond CFG assigns variable 0 differently on each arm (seed scenario
/// 3), the join's Phi feeds the placement pass and the colorer, and the
/// whole thing should come out fully colored with no spills under enough
/// registers.
#[test]
fn diamond_phi_survives_placement_and_allocation() {
    let (_tg, mut g) = new_graph();
    let var = VarId::new(0);
    let mut ssa = SsaBuilder::new();
    ssa.ssa_cons_start(&mut g, 1);

    let one = g.new_const(g.start_block, Mode::I32, 1).unwrap();
    let two = g.new_const(g.start_block, Mode::I32, 2).unwrap();
    ssa.set_value(&g, g.start_block, var, one).unwrap();

    let selector = g.new_const(g.start_block, Mode::I1, 1).unwrap();
    let cond = g.new_cond(g.start_block, selector).unwrap();
    let true_edge = g.new_proj(g.start_block, Mode::X, cond, 0).unwrap();
    let false_edge = g.new_proj(g.start_block, Mode::X, cond, 1).unwrap();

    let left = g.new_block(&[true_edge]).unwrap();
    g.mature_block(left).unwrap();
    ssa.set_value(&g, left, var, one).unwrap();
    let left_jmp = g.new_jmp(left).unwrap();

    let right = g.new_block(&[false_edge]).unwrap();
    g.mature_block(right).unwrap();
    ssa.set_value(&g, right, var, two).unwrap();
    let right_jmp = g.new_jmp(right).unwrap();

    let join = g.new_block(&[left_jmp, right_jmp]).unwrap();
    g.mature_block(join).unwrap();
    let x = ssa.get_value(&mut g, join, var, Mode::I32).unwrap();
    assert_eq!(g.node(x).opcode, Opcode::Phi);

    let mem = g.new_proj(join, Mode::M, g.start, 0).unwrap();
    g.new_return(join, mem, &[x]).unwrap();
    ssa.ssa_cons_finish(&mut g).unwrap();

    let doms = DominatorTree::compute(&mut g).unwrap();
    let loops = LoopTree::compute(&mut g, &doms).unwrap();

    let class = gp_class(4);
    let (coloring, slots) = regalloc::allocate(&mut g, &class, &loops, &UniformFreq, |_| false, Config::default()).unwrap();
    assert_eq!(slots.slot_count(), 0);
    assert!(coloring.color_of(x).is_some());
}

/// A stack allocation followed by a call lowers through `firm-abi` into a
/// `SubSP`/`CallBe`/`AddSP` sequence that still dominator-checks cleanly,
/// exactly as spec.md §4.6 describes `adjust_call` and Alloc lowering
/// composing within one function.
#[test]
fn stack_alloc_then_call_lowers_and_stays_well_formed() {
    let (_tg, mut g) = new_graph();
    let block = g.start_block;
    let sp0 = g.new_const(block, Mode::P, 0).unwrap();
    let mem0 = g.new_proj(block, Mode::M, g.start, 0).unwrap();

    let size = g.new_const(block, Mode::I32, 12).unwrap();
    let i8_ty = g.frame_type;
    let alloc = g.new_alloc(block, mem0, size, i8_ty).unwrap();
    let alloc_lowering = lower_stack_alloc(&mut g, alloc, sp0, 16).unwrap();
    assert_eq!(g.node(alloc_lowering.sp).opcode, Opcode::SubSP);

    let target = g.new_sym_const(block, Mode::P, EntityId::new(0)).unwrap();
    let a = g.new_const(block, Mode::I32, 7).unwrap();
    let mut aa = SimpleAssigner::new(2);
    let call_lowering = lower_call(
        &mut g,
        block,
        alloc_lowering.mem,
        alloc_lowering.sp,
        target,
        &[a],
        &[Mode::I32],
        &mut aa,
        16,
    )
    .unwrap();
    assert_eq!(g.node(call_lowering.sp).opcode, Opcode::AddSP);

    g.new_return(block, call_lowering.mem, &call_lowering.results).unwrap();
    g.finalize_construction().unwrap();
    DominatorTree::compute(&mut g).unwrap();
}
