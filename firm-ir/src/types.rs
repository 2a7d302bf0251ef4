//! Types and entities (spec.md §3 "Type / Entity").
//!
//! A `Type` describes a primitive, class, struct, array, or method
//! signature; an `Entity` names a field, local, parameter, or procedure and
//! belongs to exactly one owner type. Entities have stable numeric identity
//! independent of layout, which is why [`EntityId`] is a plain index rather
//! than, say, a byte offset.

use crate::entities::{EntityId, TypeRef};
use crate::mode::Mode;
use firm_entity::PrimaryMap;

/// Linkage/visibility of an entity, mirroring the teacher's
/// `ir/extname.rs`/linkage distinctions at the level this core needs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Linkage {
    Local,
    Exported,
    Imported,
    /// A weak/merge-able definition (e.g. a COMDAT-style template
    /// instantiation); not load-bearing for the core, kept so front-ends
    /// don't need to invent their own side channel for it.
    Weak,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Visibility {
    Public,
    Private,
}

/// A method signature: parameter modes plus result modes. Distinct from a
/// `Type` to keep `new_graph`'s frame-type bookkeeping (which only cares
/// about aggregate layout) separate from call-ABI concerns (which
/// `firm-abi` owns).
#[derive(Clone, Debug)]
pub struct Signature {
    pub params: Vec<Mode>,
    pub results: Vec<Mode>,
}

/// A field or array-element descriptor: an owned entity plus its byte offset
/// within the owner aggregate.
#[derive(Clone, Copy, Debug)]
pub struct Member {
    pub entity: EntityId,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub enum TypeKind {
    Primitive(Mode),
    /// A struct or class: an ordered list of member entities with offsets,
    /// a total size, and an alignment.
    Aggregate {
        members: Vec<Member>,
        size: u32,
        align: u32,
    },
    Array {
        element: TypeRef,
        element_size: u32,
        /// `None` for a front-end-unsized array (e.g. a C flexible array
        /// member or an open parameter array); placement/ABI code must
        /// treat that as "caller-supplied length".
        length: Option<u32>,
    },
    Method(Signature),
    /// A synthetic per-procedure frame type (spec.md §3 "Graph"): the
    /// aggregate of a function's locals, used by `firm-abi`'s frame
    /// composition. Distinguished from a user `Aggregate` so ABI code can
    /// recognize it without a naming convention.
    Frame {
        members: Vec<Member>,
        size: u32,
        align: u32,
    },
}

#[derive(Clone, Debug)]
pub struct Type {
    pub kind: TypeKind,
}

impl Type {
    pub fn size(&self) -> u32 {
        match &self.kind {
            TypeKind::Primitive(mode) => (mode.bits as u32 + 7) / 8,
            TypeKind::Aggregate { size, .. } | TypeKind::Frame { size, .. } => *size,
            TypeKind::Array {
                element_size,
                length,
                ..
            } => element_size * length.unwrap_or(0),
            TypeKind::Method(_) => 0,
        }
    }

    pub fn align(&self) -> u32 {
        match &self.kind {
            TypeKind::Primitive(mode) => ((mode.bits as u32 + 7) / 8).max(1),
            TypeKind::Aggregate { align, .. } | TypeKind::Frame { align, .. } => *align,
            TypeKind::Array { .. } => 1,
            TypeKind::Method(_) => 1,
        }
    }
}

/// Names a field, local, parameter, or procedure. Belongs to exactly one
/// owner type; carries an optional IR graph reference for procedures
/// (stored out-of-line by the driver, since `firm-ir` doesn't know about
/// `Graph` lifetimes here — see `firm::Program`).
#[derive(Clone, Debug)]
pub struct Entity {
    pub name: String,
    pub owner: TypeRef,
    pub ty: TypeRef,
    pub linkage: Linkage,
    pub visibility: Visibility,
}

/// The program-wide type/entity directory ("irp" in spec.md §5's shared
/// resources: "the program-wide `irp` singleton ... mutated only outside
/// pass execution"). One per compilation, shared by every `Graph`.
pub struct TypeGraph {
    types: PrimaryMap<TypeRef, Type>,
    entities: PrimaryMap<EntityId, Entity>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self {
            types: PrimaryMap::new(),
            entities: PrimaryMap::new(),
        }
    }

    pub fn new_type(&mut self, kind: TypeKind) -> TypeRef {
        self.types.push(Type { kind })
    }

    pub fn new_entity(
        &mut self,
        name: impl Into<String>,
        owner: TypeRef,
        ty: TypeRef,
        linkage: Linkage,
        visibility: Visibility,
    ) -> EntityId {
        self.entities.push(Entity {
            name: name.into(),
            owner,
            ty,
            linkage,
            visibility,
        })
    }

    pub fn ty(&self, t: TypeRef) -> &Type {
        &self.types[t]
    }

    pub fn entity(&self, e: EntityId) -> &Entity {
        &self.entities[e]
    }
}

impl Default for TypeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_identity_is_stable_across_layout() {
        let mut tg = TypeGraph::new();
        let owner = tg.new_type(TypeKind::Aggregate {
            members: vec![],
            size: 0,
            align: 1,
        });
        let field_ty = tg.new_type(TypeKind::Primitive(Mode::I32));
        let e1 = tg.new_entity("x", owner, field_ty, Linkage::Local, Visibility::Private);
        let e2 = tg.new_entity("y", owner, field_ty, Linkage::Local, Visibility::Private);
        assert_ne!(e1, e2);
        assert_eq!(tg.entity(e1).name, "x");
    }
}
