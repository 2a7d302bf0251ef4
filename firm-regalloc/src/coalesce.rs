//! MST-style copy coalescing, "heur4" (spec.md §4.5.3).
//!
//! Affinity edges (a `Phi` input or an explicit `Copy`, weighted by the
//! execution frequency of the edge's defining block) are merged greedily,
//! heaviest first, into chunks that never straddle an interference; each
//! chunk is then colored as a unit, trying colors in descending preference
//! and recursively bumping an interfering neighbor to a different color up
//! to a depth limit before giving up and peeling the chunk's unassignable
//! members into a new, independently-colored chunk.
//!
//! No teacher analogue (cranelift delegates allocation to `regalloc2`,
//! outside the retrieval pack); the union-find-over-affinity-edges shape is
//! this crate's own, built from spec.md's description, using `rustc-hash`
//! for the neighbor/weight maps the way the teacher uses it everywhere else
//! in `cranelift-codegen`.

use firm_entity::SecondaryMap;
use firm_ir::{Graph, NodeRef, Opcode};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::Error;
use crate::interference::InterferenceGraph;
use crate::reg::RegisterClass;

/// Knobs for the coalescer (spec.md §4.5.3 + SPEC_FULL.md's supplementary
/// chunk-repeel bound). `Copy` so a driver can vary it per compilation unit
/// without a global, matching this workspace's config convention.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Depth limit for the recursive "bump a conflicting neighbor to a
    /// different color" attempt (spec.md §4.5.3, default 7).
    pub max_recolor_depth: u32,
    /// How many times a leftover-node chunk may be re-peeled and
    /// re-enqueued before it is colored independently, capping pathological
    /// livelock on dense interference (SPEC_FULL.md supplementary feature).
    pub max_chunk_repeels: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_recolor_depth: 7,
            max_chunk_repeels: 3,
        }
    }
}

/// An affinity edge between two values a copy or Phi input connects,
/// weighted by the estimated execution frequency of the block the copy
/// would occur in.
#[derive(Clone, Copy, Debug)]
struct AffinityEdge {
    a: NodeRef,
    b: NodeRef,
    weight: f64,
}

/// `1 << loop_depth`, a standard stand-in for "execution frequency" when no
/// profile is available; deeper loop nesting means the copy this edge would
/// eliminate runs more often, so it should coalesce first.
pub trait BlockFrequency {
    fn frequency(&self, block: NodeRef) -> f64;
}

/// The final per-value register assignment for one class. Values that
/// could not be colored are simply absent; the caller (the allocation
/// pipeline driver) must have already ensured every value fits after the
/// Belady spiller ran, or treat an absent entry as
/// [`Error::ConstraintUnsatisfiable`].
pub struct Coloring {
    colors: SecondaryMap<NodeRef, Option<u32>>,
}

impl Coloring {
    pub fn color_of(&self, v: NodeRef) -> Option<u32> {
        *self.colors.get(v)
    }
}

struct Chunk {
    members: Vec<NodeRef>,
    weight: f64,
    repeels: u32,
}

struct HeapEntry {
    weight: f64,
    chunk: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // total_cmp so NaN (never produced here, but cheap insurance) can't
        // panic a BinaryHeap comparison.
        self.weight.total_cmp(&other.weight)
    }
}

/// Collects affinity edges: every `Phi` input (weighted by the feeding
/// predecessor's frequency) and every explicit `Copy` (weighted by its own
/// block's frequency).
fn collect_affinities(
    graph: &Graph,
    class: &RegisterClass,
    freq: &dyn BlockFrequency,
) -> Vec<AffinityEdge> {
    let mut edges = Vec::new();
    for n in graph.node_refs() {
        let node = graph.node(n);
        match node.opcode {
            Opcode::Phi => {
                let block_preds = &graph.node(node.block).inputs;
                for (i, &input) in node.inputs.iter().enumerate() {
                    if !in_class(graph, input, class) || !in_class(graph, n, class) {
                        continue;
                    }
                    let pred_ctrl = block_preds[i];
                    let pred_block = graph.node(pred_ctrl).block;
                    edges.push(AffinityEdge {
                        a: n,
                        b: input,
                        weight: freq.frequency(pred_block),
                    });
                }
            }
            Opcode::Copy => {
                let src = node.inputs[0];
                if in_class(graph, src, class) && in_class(graph, n, class) {
                    edges.push(AffinityEdge {
                        a: n,
                        b: src,
                        weight: freq.frequency(node.block),
                    });
                }
            }
            _ => {}
        }
    }
    edges
}

fn in_class(graph: &Graph, n: NodeRef, class: &RegisterClass) -> bool {
    let mode = graph.node(n).mode;
    if !mode.is_data() || mode.is_memory() {
        return false;
    }
    match class.name {
        "fp" => matches!(mode.kind, firm_ir::ModeKind::Float),
        _ => !matches!(mode.kind, firm_ir::ModeKind::Float),
    }
}

/// Greedily merges affinity edges heaviest-first into chunks, skipping any
/// merge that would put two interfering values in the same chunk.
fn build_chunks(
    all_values: &[NodeRef],
    edges: &[AffinityEdge],
    interference: &InterferenceGraph,
) -> Vec<Chunk> {
    let mut sorted: Vec<&AffinityEdge> = edges.iter().collect();
    sorted.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    let mut chunk_of: FxHashMap<NodeRef, usize> = FxHashMap::default();
    let mut chunks: Vec<Chunk> = Vec::new();
    for &v in all_values {
        chunk_of.insert(v, chunks.len());
        chunks.push(Chunk {
            members: vec![v],
            weight: 0.0,
            repeels: 0,
        });
    }

    for edge in sorted {
        let ca = chunk_of[&edge.a];
        let cb = chunk_of[&edge.b];
        if ca == cb {
            chunks[ca].weight += edge.weight;
            continue;
        }
        let conflicts = chunks[ca]
            .members
            .iter()
            .any(|&m| chunks[cb].members.iter().any(|&o| interference.interferes(m, o)));
        if conflicts {
            continue;
        }
        let moved = std::mem::take(&mut chunks[cb].members);
        let moved_weight = chunks[cb].weight;
        chunks[ca].members.extend(moved.iter().copied());
        chunks[ca].weight += moved_weight + edge.weight;
        for m in moved {
            chunk_of.insert(m, ca);
        }
    }

    chunks.into_iter().filter(|c| !c.members.is_empty()).collect()
}

/// Recursively try to give `node` color `want`, bumping at most one
/// interfering neighbor per level of recursion to a different color.
/// Returns the set of `(node, old_color)` reassignments to apply on
/// success, or `None` if `depth` is exhausted without finding a free color
/// for every displaced neighbor.
fn try_color(
    node: NodeRef,
    want: u32,
    class: &RegisterClass,
    interference: &InterferenceGraph,
    colors: &SecondaryMap<NodeRef, Option<u32>>,
    depth: u32,
    max_depth: u32,
) -> Option<Vec<(NodeRef, u32)>> {
    let mut plan = Vec::new();
    for &neighbor in interference.neighbors(node) {
        if colors.get(neighbor) != &Some(want) {
            continue;
        }
        if depth >= max_depth {
            return None;
        }
        let alt = class
            .allocatable()
            .map(|r| r.index)
            .find(|&c| c != want && !neighbor_conflicts(neighbor, c, interference, colors, &plan));
        let alt = alt?;
        plan.push((neighbor, alt));
    }
    plan.push((node, want));
    Some(plan)
}

fn neighbor_conflicts(
    node: NodeRef,
    color: u32,
    interference: &InterferenceGraph,
    colors: &SecondaryMap<NodeRef, Option<u32>>,
    pending: &[(NodeRef, u32)],
) -> bool {
    interference.neighbors(node).iter().any(|&n| {
        let effective = pending
            .iter()
            .find(|&&(p, _)| p == n)
            .map(|&(_, c)| Some(c))
            .unwrap_or_else(|| *colors.get(n));
        effective == Some(color)
    })
}

/// Colors `chunk` as a unit with a single color, recursively bumping
/// conflicting neighbors. Returns `true` and commits the coloring on
/// success.
fn color_chunk(
    chunk: &Chunk,
    class: &RegisterClass,
    interference: &InterferenceGraph,
    colors: &mut SecondaryMap<NodeRef, Option<u32>>,
    max_depth: u32,
) -> bool {
    'color: for reg in class.allocatable() {
        let mut combined_plan = Vec::new();
        for &member in &chunk.members {
            match try_color(member, reg.index, class, interference, colors, 0, max_depth) {
                Some(plan) => combined_plan.extend(plan),
                None => continue 'color,
            }
        }
        for &(n, c) in &combined_plan {
            *colors.ensure_set(n) = Some(c);
        }
        return true;
    }
    false
}

/// Runs heur4 copy coalescing and coloring for one register class over
/// every value already known to need a register in `class` (pre-spill: the
/// caller should have already run the Belady spiller so pressure fits).
pub fn coalesce_and_color(
    graph: &Graph,
    class: &RegisterClass,
    interference: &InterferenceGraph,
    freq: &dyn BlockFrequency,
    values: &[NodeRef],
    config: Config,
) -> Result<Coloring, Error> {
    let edges = collect_affinities(graph, class, freq);
    let mut chunks = build_chunks(values, &edges, interference);
    log::debug!(
        "coalesce[{}]: {} affinity edges, {} initial chunks",
        class.name,
        edges.len(),
        chunks.len()
    );

    let mut colors: SecondaryMap<NodeRef, Option<u32>> = SecondaryMap::new();
    let mut heap = BinaryHeap::new();
    for (i, c) in chunks.iter().enumerate() {
        heap.push(HeapEntry { weight: c.weight, chunk: i });
    }

    while let Some(HeapEntry { chunk: idx, .. }) = heap.pop() {
        let ok = color_chunk(&chunks[idx], class, interference, &mut colors, config.max_recolor_depth);
        if ok {
            continue;
        }
        // No color worked for the whole chunk as a unit: peel leftover
        // members (those still uncolored) into their own singleton chunks
        // and re-enqueue each, bounded by `max_chunk_repeels`.
        let repeels = chunks[idx].repeels;
        if repeels >= config.max_chunk_repeels {
            for &m in &chunks[idx].members {
                if colors.get(m).is_none() {
                    return Err(Error::ConstraintUnsatisfiable {
                        node: m,
                        class: class.name,
                    });
                }
            }
            continue;
        }
        let leftover: Vec<NodeRef> = chunks[idx].members.iter().copied().filter(|&m| colors.get(m).is_none()).collect();
        log::trace!(
            "coalesce[{}]: chunk {} failed to color as a unit, peeling {} members",
            class.name,
            idx,
            leftover.len()
        );
        for m in leftover {
            let new_idx = chunks.len();
            chunks.push(Chunk {
                members: vec![m],
                weight: 0.0,
                repeels: repeels + 1,
            });
            heap.push(HeapEntry { weight: 0.0, chunk: new_idx });
        }
    }

    Ok(Coloring { colors })
}
