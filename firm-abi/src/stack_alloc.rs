//! Alloc/Free lowering (spec.md §4.6: "`Alloc(size, type)` with
//! `where = stack_alloc` becomes a `SubSP`/`AddSP` node whose result is the
//! new SP. Size is aligned up to the target's stack alignment.").
//!
//! No teacher analogue (cranelift's stack slots are declared up front in
//! `ir/stackslot.rs`, not lowered from a generic `Alloc` node at this
//! layer); built directly against `firm-ir::Graph`'s `new_sub_sp`/
//! `new_add_sp`. This core's `Alloc`/`Free` opcodes don't themselves carry
//! the `where` tag spec.md mentions — that classification is made by
//! whatever front-end or earlier pass decided a given `Alloc` belongs on
//! the stack, so this module lowers exactly the nodes its caller hands it,
//! rather than scanning the whole graph for a tag that isn't in `Attrs`.

use firm_ir::{Graph, NodeRef, Opcode};

use crate::error::Error;

fn round_up(v: u32, align: u32) -> u32 {
    (v + align - 1) / align * align
}

/// The result of lowering one stack `Alloc`: the pointer to the allocated
/// region, the memory token flowing through it unchanged, and the new SP.
pub struct AllocLowering {
    pub ptr: NodeRef,
    pub mem: NodeRef,
    pub sp: NodeRef,
}

/// Lowers `alloc` (an `Opcode::Alloc` node: inputs `[mem, size]`) into a
/// `SubSP` that carves `size` bytes (rounded up to `stack_align`) off the
/// top of the stack. `size` must be a compile-time constant: `SubSP`'s
/// byte delta is a fixed attribute (spec.md §4.6), so a dynamically-sized
/// allocation has no representation at this layer.
pub fn lower_stack_alloc(graph: &mut Graph, alloc: NodeRef, sp: NodeRef, stack_align: u32) -> Result<AllocLowering, Error> {
    let node = graph.node(alloc);
    debug_assert_eq!(node.opcode, Opcode::Alloc);
    let mem = node.inputs[0];
    let size_node = node.inputs[1];
    let block = node.block;

    let size = graph
        .node(size_node)
        .int_const()
        .ok_or(Error::NonConstantAllocSize { node: alloc })?;
    let bytes = round_up(size as u32, stack_align.max(1));

    let sp_after = graph.new_sub_sp(block, sp, bytes, false)?;
    log::debug!("lower_stack_alloc: {} bytes at {:?}", bytes, alloc);
    Ok(AllocLowering {
        ptr: sp_after,
        mem,
        sp: sp_after,
    })
}

/// Lowers `free` (an `Opcode::Free` node: inputs `[mem, ptr]`) into an
/// `AddSP` undoing the matching `lower_stack_alloc`'s `SubSP`. The caller
/// is responsible for pairing each `Free` with the `Alloc`'s byte count
/// (spec.md's stack discipline requires LIFO deallocation; this module
/// doesn't itself verify nesting, the same way `new_inc_sp`'s own callers
/// are trusted to balance their deltas).
pub fn lower_stack_free(graph: &mut Graph, free: NodeRef, sp: NodeRef, bytes: u32) -> Result<NodeRef, Error> {
    let node = graph.node(free);
    debug_assert_eq!(node.opcode, Opcode::Free);
    let mem = node.inputs[0];
    let block = node.block;
    let sp_after = graph.new_add_sp(block, sp, bytes, false)?;
    let _ = mem;
    Ok(sp_after)
}
