//! `SecondaryMap<E, V>` attaches a side-table of `V`s to entities owned by
//! some other `PrimaryMap`, growing lazily and defaulting missing rows.
//!
//! This is the vehicle for all of the "transient per-pass data" spec.md
//! warns against making intrusive node fields: a dominance pass allocates a
//! `SecondaryMap<NodeRef, DomInfo>`, fills it in, and drops it when done,
//! rather than widening every node with fields only one pass ever reads.

use crate::entity_ref::EntityRef;
use std::marker::PhantomData;

/// A map from entity references to `V`, where looking up a key that was
/// never explicitly set yields `V::default()` rather than panicking.
#[derive(Clone)]
pub struct SecondaryMap<E: EntityRef, V: Clone + Default> {
    elems: Vec<V>,
    default: V,
    _marker: PhantomData<E>,
}

impl<E: EntityRef, V: Clone + Default> SecondaryMap<E, V> {
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            default: V::default(),
            _marker: PhantomData,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elems: Vec::with_capacity(capacity),
            default: V::default(),
            _marker: PhantomData,
        }
    }

    pub fn get(&self, e: E) -> &V {
        self.elems.get(e.index()).unwrap_or(&self.default)
    }

    /// Resize the backing storage (if necessary) then return a mutable
    /// reference to `e`'s row.
    pub fn ensure_set(&mut self, e: E) -> &mut V {
        let idx = e.index();
        if idx >= self.elems.len() {
            self.elems.resize(idx + 1, self.default.clone());
        }
        &mut self.elems[idx]
    }

    pub fn clear(&mut self) {
        self.elems.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }
}

impl<E: EntityRef, V: Clone + Default> Default for SecondaryMap<E, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityRef, V: Clone + Default> std::ops::Index<E> for SecondaryMap<E, V> {
    type Output = V;

    fn index(&self, e: E) -> &V {
        self.get(e)
    }
}

impl<E: EntityRef, V: Clone + Default> std::ops::IndexMut<E> for SecondaryMap<E, V> {
    fn index_mut(&mut self, e: E) -> &mut V {
        self.ensure_set(e)
    }
}

/// A growable bitset over entities, used where a `SecondaryMap<E, bool>`
/// would otherwise burn a byte per entry; backs the visit-counter's "on
/// stack" bit in two-phase walks.
#[derive(Clone)]
pub struct EntitySet<E: EntityRef> {
    bits: Vec<u64>,
    _marker: PhantomData<E>,
}

impl<E: EntityRef> EntitySet<E> {
    pub fn new() -> Self {
        Self {
            bits: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn contains(&self, e: E) -> bool {
        let idx = e.index();
        let word = idx / 64;
        let bit = idx % 64;
        self.bits.get(word).map_or(false, |w| w & (1 << bit) != 0)
    }

    pub fn insert(&mut self, e: E) {
        let idx = e.index();
        let word = idx / 64;
        let bit = idx % 64;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1 << bit;
    }

    pub fn remove(&mut self, e: E) {
        let idx = e.index();
        let word = idx / 64;
        let bit = idx % 64;
        if let Some(w) = self.bits.get_mut(word) {
            *w &= !(1 << bit);
        }
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }
}

impl<E: EntityRef> Default for EntitySet<E> {
    fn default() -> Self {
        Self::new()
    }
}
