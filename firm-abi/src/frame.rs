//! Frame composition (spec.md §4.6 "Frame composition").
//!
//! No single teacher file (the per-ISA `abi.rs` files retrieved for
//! `cranelift/codegen/src/isa/*` are instruction-selection specific and out
//! of this spec's scope); laid out in the style of `firm-ir::types`'s own
//! `TypeKind::Frame { members, size, align }`, which this module consumes
//! and extends with the two areas spec.md adds on top of locals.

use firm_entity::EntityId;
use firm_ir::{TypeGraph, TypeKind, TypeRef};
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StackGrowth {
    /// SP decreases as the frame grows (the common case: x86, most RISC
    /// ABIs).
    Down,
    Up,
}

/// One area's shape: an ordered list of `(entity, size, align)`.
pub struct Area {
    pub members: Vec<(EntityId, u32, u32)>,
}

impl Area {
    fn layout(&self, base: u32) -> (FxHashMap<EntityId, u32>, u32) {
        let mut offsets = FxHashMap::default();
        let mut cursor = base;
        let mut max_align = 1u32;
        for &(entity, size, align) in &self.members {
            cursor = round_up(cursor, align.max(1));
            offsets.insert(entity, cursor);
            cursor += size;
            max_align = max_align.max(align.max(1));
        }
        (offsets, round_up(cursor, max_align))
    }
}

fn round_up(v: u32, align: u32) -> u32 {
    (v + align - 1) / align * align
}

/// The composed frame: every entity's final byte offset (from the frame's
/// own base, address-increasing regardless of growth direction), the
/// frame's total size/alignment, and `initial_offset` — "the distance from
/// SP-at-function-entry to the frame-pointer reference" spec.md asks for.
pub struct FrameLayout {
    offsets: FxHashMap<EntityId, i32>,
    pub size: u32,
    pub align: u32,
    pub initial_offset: i32,
}

impl FrameLayout {
    pub fn offset_of(&self, entity: EntityId) -> Option<i32> {
        self.offsets.get(&entity).copied()
    }
}

/// Concatenates the arguments area, the "between" area (return address,
/// saved frame pointer), and the locals area (read from `frame_ty`'s
/// `TypeKind::Frame` members) in growth-direction order, and records
/// `initial_offset` as the locals area's base — the point a frame pointer,
/// if the target keeps one, would reference.
pub fn compose_frame(
    tg: &TypeGraph,
    frame_ty: TypeRef,
    args_area: &Area,
    between_size: u32,
    between_align: u32,
    growth: StackGrowth,
) -> FrameLayout {
    // Locals already have offsets within the frame type (front-end-assigned,
    // per `TypeKind::Frame`'s own `members`/`size`/`align`); this module
    // only needs to shift that block by the composed base below.
    let (local_offsets, locals_size, locals_align): (Vec<(EntityId, u32)>, u32, u32) = match &tg.ty(frame_ty).kind {
        TypeKind::Frame { members, size, align } => (members.iter().map(|m| (m.entity, m.offset)).collect(), *size, *align),
        _ => (Vec::new(), 0, 1),
    };

    let areas_in_order: Vec<(&str, u32, u32)> = match growth {
        StackGrowth::Down => vec![
            ("args", 0, 1),
            ("between", between_size, between_align),
            ("locals", locals_size, locals_align),
        ],
        StackGrowth::Up => vec![
            ("locals", locals_size, locals_align),
            ("between", between_size, between_align),
            ("args", 0, 1),
        ],
    };

    let mut offsets: FxHashMap<EntityId, i32> = FxHashMap::default();
    let mut cursor = 0u32;
    let mut max_align = 1u32;
    let mut initial_offset = 0i32;
    let (args_offsets, args_size) = args_area.layout(0);

    for (name, size, align) in areas_in_order {
        cursor = round_up(cursor, align.max(1));
        match name {
            "args" => {
                for &(entity, _, _) in &args_area.members {
                    if let Some(&off) = args_offsets.get(&entity) {
                        offsets.insert(entity, (cursor + off) as i32);
                    }
                }
                cursor += args_size;
            }
            "between" => {
                cursor += size;
            }
            "locals" => {
                initial_offset = cursor as i32;
                for &(entity, off) in &local_offsets {
                    offsets.insert(entity, cursor as i32 + off as i32);
                }
                cursor += size;
            }
            _ => unreachable!(),
        }
        max_align = max_align.max(align.max(1));
    }

    FrameLayout {
        offsets,
        size: round_up(cursor, max_align),
        align: max_align,
        initial_offset,
    }
}
