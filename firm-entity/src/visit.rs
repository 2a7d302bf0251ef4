//! Graph-wide visit counters.
//!
//! A "walk" over a graph increments a single counter once and stamps each
//! node it touches with the new value; membership in the walk's visited set
//! is then an O(1) integer comparison instead of a hash-set probe or a
//! per-node allocation. Two-phase walks (e.g. a DFS that needs to
//! distinguish "currently on the stack" from "fully processed", as
//! dominance/loop-tree computation does) bump the counter twice and compare
//! against both generations.

use crate::entity_ref::EntityRef;
use crate::secondary_map::SecondaryMap;

/// The graph-wide monotonic counter plus the per-node stamps it compares
/// against.
///
/// One `VisitCounter<E>` is created per entity kind a graph needs to walk
/// (typically one for nodes). `inc` starts a new walk; `mark`/`was_visited`
/// query/update a single node's stamp against the *current* walk generation.
pub struct VisitCounter<E: EntityRef> {
    current: u32,
    stamps: SecondaryMap<E, u32>,
}

impl<E: EntityRef> VisitCounter<E> {
    pub fn new() -> Self {
        Self {
            current: 0,
            stamps: SecondaryMap::new(),
        }
    }

    /// Begin a new walk. Returns the generation number just started, mostly
    /// useful for two-phase walks that need to remember "on stack" (the
    /// generation returned by the first `inc`) separately from "finished"
    /// (the generation returned by a second `inc`).
    pub fn inc(&mut self) -> u32 {
        self.current += 1;
        self.current
    }

    pub fn current_generation(&self) -> u32 {
        self.current
    }

    /// Mark `e` as visited in the *current* generation.
    pub fn mark(&mut self, e: E) {
        *self.stamps.ensure_set(e) = self.current;
    }

    /// Mark `e` as visited in a specific generation (for two-phase walks
    /// recording "on stack" while a later generation is "finished").
    pub fn mark_generation(&mut self, e: E, generation: u32) {
        *self.stamps.ensure_set(e) = generation;
    }

    /// Has `e` been marked in the current generation?
    pub fn visited(&self, e: E) -> bool {
        *self.stamps.get(e) == self.current
    }

    /// Has `e` been marked in exactly `generation`?
    pub fn visited_generation(&self, e: E, generation: u32) -> bool {
        *self.stamps.get(e) == generation
    }

    pub fn clear(&mut self) {
        self.current = 0;
        self.stamps.clear();
    }
}

impl<E: EntityRef> Default for VisitCounter<E> {
    fn default() -> Self {
        Self::new()
    }
}
