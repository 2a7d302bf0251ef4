//! The per-procedure graph (spec.md §3 "Graph", §4.2 "Construction API").
//!
//! Grounded on `cranelift/codegen/src/ir/function.rs` (a `Function` owns its
//! `DataFlowGraph` + `Layout` + `Signature`) and `ir/layout.rs`'s linked
//! block order, reshaped into the single arena-owned sea-of-nodes graph
//! spec.md describes: here the block is part of every node's input list
//! (slot -1) rather than tracked by a side `Layout`, and nodes may *float*
//! rather than always living in a fixed instruction order.

use crate::entities::{EntityId, NodeRef, TypeRef, VarId};
use crate::error::{Error, Invariant};
use crate::mode::Mode;
use crate::node::{Attrs, CmpKind, Inputs, Node, PinState};
use crate::opcode::Opcode;
use firm_entity::value_table::{CtxEq, CtxHash, ValueTable};
use firm_entity::{Arena, PrimaryMap, ResourceLocks, SecondaryMap, VisitCounter};
use smallvec::smallvec;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConstructionState {
    Building,
    Constructed,
}

#[derive(Clone, Default)]
struct BlockInfo {
    matured: bool,
    dead: bool,
}

/// Owns everything belonging to one procedure's IR: the arena, the node
/// table, visit/resource/value-numbering machinery, and the distinguished
/// `Start`/`End` nodes (spec.md §3 "Graph").
pub struct Graph {
    pub entity: EntityId,
    pub frame_type: TypeRef,
    n_locals: usize,

    arena: Arena,
    nodes: PrimaryMap<NodeRef, Node>,
    block_info: SecondaryMap<NodeRef, BlockInfo>,
    uses: SecondaryMap<NodeRef, Vec<(NodeRef, i32)>>,

    node_visited: VisitCounter<NodeRef>,
    resources: ResourceLocks,
    value_table: ValueTable<NodeRef>,
    unknown_cache: HashMap<Mode, NodeRef>,
    keepalives: Vec<NodeRef>,

    pub start_block: NodeRef,
    pub start: NodeRef,
    pub end_block: NodeRef,
    pub end: NodeRef,

    state: ConstructionState,
}

/// The context used to intern pure, floating nodes in the value table:
/// structural equality/hash over `(opcode, mode, attrs, inputs)` where
/// inputs compare by `NodeRef` identity (spec.md §4.1's value-numbering
/// contract).
struct InternCtx<'a> {
    nodes: &'a PrimaryMap<NodeRef, Node>,
}

fn attrs_eq(a: &Attrs, b: &Attrs) -> bool {
    match (a, b) {
        (Attrs::None, Attrs::None) => true,
        (Attrs::Entity(x), Attrs::Entity(y)) => x == y,
        (Attrs::Type(x), Attrs::Type(y)) => x == y,
        (Attrs::IntConst(x), Attrs::IntConst(y)) => x == y,
        (Attrs::FloatConst(x), Attrs::FloatConst(y)) => x == y,
        (Attrs::ProjIndex(x), Attrs::ProjIndex(y)) => x == y,
        (Attrs::SsaVar(x), Attrs::SsaVar(y)) => x == y,
        (Attrs::Cmp(x), Attrs::Cmp(y)) => x == y,
        (Attrs::StackDelta { bytes: bx, align: ax }, Attrs::StackDelta { bytes: by, align: ay }) => {
            bx == by && ax == ay
        }
        _ => false,
    }
}

fn hash_attrs<H: std::hash::Hasher>(attrs: &Attrs, state: &mut H) {
    use std::hash::Hash;
    std::mem::discriminant(attrs).hash(state);
    match attrs {
        Attrs::Entity(x) => x.hash(state),
        Attrs::Type(x) => x.hash(state),
        Attrs::IntConst(x) => x.hash(state),
        Attrs::FloatConst(x) => x.hash(state),
        Attrs::ProjIndex(x) => x.hash(state),
        Attrs::SsaVar(x) => x.hash(state),
        Attrs::Cmp(x) => (*x as u8).hash(state),
        Attrs::StackDelta { bytes, align } => {
            bytes.hash(state);
            align.hash(state);
        }
        Attrs::None => {}
    }
}

impl<'a> CtxEq<NodeRef, NodeRef> for InternCtx<'a> {
    fn ctx_eq(&self, a: &NodeRef, b: &NodeRef) -> bool {
        let na = &self.nodes[*a];
        let nb = &self.nodes[*b];
        na.opcode == nb.opcode
            && na.mode == nb.mode
            && attrs_eq(&na.attrs, &nb.attrs)
            && na.inputs == nb.inputs
            && na.block == nb.block
    }
}

impl<'a> CtxHash<NodeRef> for InternCtx<'a> {
    fn ctx_hash(&self, key: &NodeRef) -> u64 {
        use std::hash::{Hash, Hasher};
        let n = &self.nodes[*key];
        let mut h = rustc_hash::FxHasher::default();
        n.opcode.hash(&mut h);
        n.mode.hash(&mut h);
        hash_attrs(&n.attrs, &mut h);
        n.inputs.hash(&mut h);
        h.finish()
    }
}

/// Opcodes eligible for value-numbering: pure, floating, side-effect-free.
fn is_internable(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Const | Opcode::SymConst | Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Cmp
    )
}

impl Graph {
    /// `new_graph(entity, n_locals)`: allocate the arena, create
    /// `Start`/`StartBlock`/`End`/`EndBlock`.
    pub fn new_graph(entity: EntityId, frame_type: TypeRef, n_locals: usize) -> Self {
        let arena = Arena::new();
        let mut nodes = PrimaryMap::new();

        let start_block = nodes.push(Node {
            opcode: Opcode::Block,
            mode: Mode::X,
            block: NodeRef::new(0), // fixed up below; Block nodes self-reference
            inputs: Inputs::new(),
            pin: PinState::PinnedToBlock,
            attrs: Attrs::None,
        });
        nodes[start_block].block = start_block;

        let start = nodes.push(Node {
            opcode: Opcode::Start,
            mode: Mode::T,
            block: start_block,
            inputs: Inputs::new(),
            pin: PinState::PinnedToBlock,
            attrs: Attrs::None,
        });

        let end_block = nodes.push(Node {
            opcode: Opcode::Block,
            mode: Mode::X,
            block: NodeRef::new(0),
            inputs: Inputs::new(),
            pin: PinState::PinnedToBlock,
            attrs: Attrs::None,
        });
        nodes[end_block].block = end_block;

        let end = nodes.push(Node {
            opcode: Opcode::End,
            mode: Mode::X,
            block: end_block,
            inputs: Inputs::new(),
            pin: PinState::PinnedToBlock,
            attrs: Attrs::None,
        });

        let mut g = Self {
            entity,
            frame_type,
            n_locals,
            arena,
            nodes,
            block_info: SecondaryMap::new(),
            uses: SecondaryMap::new(),
            node_visited: VisitCounter::new(),
            resources: ResourceLocks::new(),
            value_table: ValueTable::new(),
            unknown_cache: HashMap::new(),
            keepalives: Vec::new(),
            start_block,
            start,
            end_block,
            end,
            state: ConstructionState::Building,
        };
        // The start block has zero predecessors by construction; seal it
        // immediately so get_value recursion into it terminates.
        g.block_info.ensure_set(start_block).matured = true;
        log::debug!(
            "new_graph: entity={:?} start_block={} end_block={}",
            entity,
            start_block,
            end_block
        );
        g
    }

    pub fn state(&self) -> ConstructionState {
        self.state
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn node(&self, n: NodeRef) -> &Node {
        &self.nodes[n]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_refs(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.nodes.keys()
    }

    pub fn uses_of(&self, n: NodeRef) -> &[(NodeRef, i32)] {
        self.uses.get(n)
    }

    pub fn is_dead_block(&self, b: NodeRef) -> bool {
        self.block_info.get(b).dead
    }

    pub fn is_matured(&self, b: NodeRef) -> bool {
        self.block_info.get(b).matured
    }

    pub fn dead_blocks(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.nodes
            .keys()
            .filter(move |&n| self.nodes[n].is_block() && self.is_dead_block(n))
    }

    pub fn keepalives(&self) -> &[NodeRef] {
        &self.keepalives
    }

    pub fn add_end_keepalive(&mut self, n: NodeRef) {
        if !self.keepalives.contains(&n) {
            self.keepalives.push(n);
            self.record_use(n, self.end, -2);
        }
    }

    fn require_building(&self) -> Result<(), Error> {
        if self.state != ConstructionState::Building {
            return Err(Error::NotBuilding);
        }
        Ok(())
    }

    fn record_use(&mut self, input: NodeRef, user: NodeRef, slot: i32) {
        self.uses.ensure_set(input).push((user, slot));
    }

    fn remove_use(&mut self, input: NodeRef, user: NodeRef, slot: i32) {
        let list = self.uses.ensure_set(input);
        if let Some(pos) = list.iter().position(|&(u, s)| u == user && s == slot) {
            list.swap_remove(pos);
        }
    }

    /// `new_block(preds[])`: create an immature block. Predecessors may
    /// still be appended with [`Graph::add_pred`] until
    /// [`Graph::mature_block`] seals it.
    pub fn new_block(&mut self, preds: &[NodeRef]) -> Result<NodeRef, Error> {
        self.require_building()?;
        let b = self.nodes.push(Node {
            opcode: Opcode::Block,
            mode: Mode::X,
            block: NodeRef::new(0),
            inputs: preds.iter().copied().collect(),
            pin: PinState::PinnedToBlock,
            attrs: Attrs::None,
        });
        self.nodes[b].block = b;
        for (i, &p) in preds.iter().enumerate() {
            self.record_use(p, b, i as i32);
        }
        Ok(b)
    }

    /// Append a control predecessor to an immature block.
    pub fn add_pred(&mut self, block: NodeRef, pred: NodeRef) -> Result<(), Error> {
        self.require_building()?;
        if self.block_info.get(block).matured {
            return Err(Error::BlockAlreadyMatured(block));
        }
        let slot = self.nodes[block].inputs.len() as i32;
        self.nodes[block].inputs.push(pred);
        self.record_use(pred, block, slot);
        Ok(())
    }

    /// `mature_block(block)`: seal the block. The caller (typically
    /// `firm-ssa`) is responsible for resolving any `Phi0` placeholders that
    /// referred to this block *before* calling this, per spec.md §4.3's
    /// `mature_block` contract; this method itself just fixes the
    /// predecessor list and updates the `dead` state.
    pub fn mature_block(&mut self, block: NodeRef) -> Result<(), Error> {
        self.require_building()?;
        let info = self.block_info.ensure_set(block);
        if info.matured {
            return Err(Error::BlockAlreadyMatured(block));
        }
        info.matured = true;
        self.refresh_dead(block);
        Ok(())
    }

    /// A block becomes `dead` when every control predecessor is `Bad`
    /// (spec.md "State machine for a Block").
    fn refresh_dead(&mut self, block: NodeRef) {
        let preds = self.nodes[block].inputs.clone();
        let matured = self.block_info.get(block).matured;
        let all_bad = matured
            && !preds.is_empty()
            && preds
                .iter()
                .all(|&p| self.nodes[p].opcode == Opcode::Bad);
        // An entry block (zero preds) is only "dead" if it isn't the start
        // block; the start block is always live by definition.
        let zero_pred_dead = matured && preds.is_empty() && block != self.start_block;
        self.block_info.ensure_set(block).dead = all_bad || zero_pred_dead;
    }

    /// Per-graph canonical `Unknown` node for `mode`, created lazily
    /// (supplementary feature from SPEC_FULL.md, grounded in the reference
    /// implementation's per-mode `Unknown` cache).
    pub fn unknown(&mut self, mode: Mode) -> NodeRef {
        if let Some(&n) = self.unknown_cache.get(&mode) {
            return n;
        }
        let n = self.nodes.push(Node {
            opcode: Opcode::Unknown,
            mode,
            block: self.start_block,
            inputs: Inputs::new(),
            pin: PinState::Floats,
            attrs: Attrs::None,
        });
        self.unknown_cache.insert(mode, n);
        n
    }

    fn push_node(
        &mut self,
        opcode: Opcode,
        mode: Mode,
        block: NodeRef,
        inputs: Inputs,
        pin: PinState,
        attrs: Attrs,
    ) -> NodeRef {
        let n = self.nodes.push(Node {
            opcode,
            mode,
            block,
            inputs: inputs.clone(),
            pin,
            attrs,
        });
        self.record_use(block, n, -1);
        for (i, &inp) in inputs.iter().enumerate() {
            self.record_use(inp, n, i as i32);
        }
        if is_internable(opcode) {
            let ctx = InternCtx { nodes: &self.nodes };
            let canonical = self.value_table.insert(&ctx, n);
            if canonical != n {
                // Undo the use-edges we just recorded for the abandoned
                // duplicate; it stays allocated (arena-style: nothing is
                // individually freed) but should not appear as a user of
                // anything.
                self.remove_use(block, n, -1);
                for (i, &inp) in inputs.iter().enumerate() {
                    self.remove_use(inp, n, i as i32);
                }
                return canonical;
            }
        }
        n
    }

    /// `new_<Op>` constructors. A handful of representative opcodes are
    /// given typed, mode-checked builders; the sea-of-nodes model means
    /// every one funnels through the same input/use bookkeeping, so adding
    /// an opcode here is mechanical.
    pub fn new_const(&mut self, block: NodeRef, mode: Mode, value: i64) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::Const,
            mode,
            block,
            Inputs::new(),
            PinState::Floats,
            Attrs::IntConst(value),
        ))
    }

    pub fn new_sym_const(
        &mut self,
        block: NodeRef,
        mode: Mode,
        entity: EntityId,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::SymConst,
            mode,
            block,
            Inputs::new(),
            PinState::Floats,
            Attrs::Entity(entity),
        ))
    }

    fn check_mode(&self, op: &'static str, slot: usize, expected: Mode, actual: Mode) -> Result<(), Error> {
        if expected != actual {
            return Err(Error::ModeMismatch {
                op,
                slot,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn new_binop(
        &mut self,
        opcode: Opcode,
        name: &'static str,
        block: NodeRef,
        lhs: NodeRef,
        rhs: NodeRef,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        let lm = self.nodes[lhs].mode;
        let rm = self.nodes[rhs].mode;
        self.check_mode(name, 1, lm, rm)?;
        Ok(self.push_node(
            opcode,
            lm,
            block,
            smallvec![lhs, rhs],
            PinState::Floats,
            Attrs::None,
        ))
    }

    pub fn new_add(&mut self, block: NodeRef, lhs: NodeRef, rhs: NodeRef) -> Result<NodeRef, Error> {
        self.new_binop(Opcode::Add, "Add", block, lhs, rhs)
    }

    pub fn new_sub(&mut self, block: NodeRef, lhs: NodeRef, rhs: NodeRef) -> Result<NodeRef, Error> {
        self.new_binop(Opcode::Sub, "Sub", block, lhs, rhs)
    }

    pub fn new_mul(&mut self, block: NodeRef, lhs: NodeRef, rhs: NodeRef) -> Result<NodeRef, Error> {
        self.new_binop(Opcode::Mul, "Mul", block, lhs, rhs)
    }

    pub fn new_cmp(
        &mut self,
        block: NodeRef,
        kind: CmpKind,
        lhs: NodeRef,
        rhs: NodeRef,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        let lm = self.nodes[lhs].mode;
        let rm = self.nodes[rhs].mode;
        self.check_mode("Cmp", 1, lm, rm)?;
        Ok(self.push_node(
            Opcode::Cmp,
            Mode::I1,
            block,
            smallvec![lhs, rhs],
            PinState::Floats,
            Attrs::Cmp(kind),
        ))
    }

    /// `new_Phi`: directly constructs a Phi with known inputs. The SSA
    /// constructor (`firm-ssa`) drives `Phi0` placeholders and trivial-Phi
    /// removal on top of this primitive; this is the low-level constructor
    /// spec.md's "new_<Op> constructors for every opcode" calls for.
    pub fn new_phi(
        &mut self,
        block: NodeRef,
        mode: Mode,
        inputs: &[NodeRef],
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        for (i, &inp) in inputs.iter().enumerate() {
            self.check_mode("Phi", i, mode, self.nodes[inp].mode)?;
        }
        let n = self.nodes.push(Node {
            opcode: Opcode::Phi,
            mode,
            block,
            inputs: inputs.iter().copied().collect(),
            pin: PinState::PinnedToBlock,
            attrs: Attrs::None,
        });
        self.record_use(block, n, -1);
        for (i, &inp) in inputs.iter().enumerate() {
            self.record_use(inp, n, i as i32);
        }
        Ok(n)
    }

    /// `new_Phi0`: the SSA constructor's immature-block placeholder
    /// (spec.md §4.3 step 2). Carries the source variable so
    /// `mature_block`'s caller can find it again.
    pub fn new_phi0(&mut self, block: NodeRef, mode: Mode, var: VarId) -> Result<NodeRef, Error> {
        self.require_building()?;
        let n = self.nodes.push(Node {
            opcode: Opcode::Phi0,
            mode,
            block,
            inputs: Inputs::new(),
            pin: PinState::PinnedToBlock,
            attrs: Attrs::SsaVar(var),
        });
        self.record_use(block, n, -1);
        Ok(n)
    }

    pub fn new_jmp(&mut self, block: NodeRef) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::Jmp,
            Mode::X,
            block,
            Inputs::new(),
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_cond(&mut self, block: NodeRef, selector: NodeRef) -> Result<NodeRef, Error> {
        self.require_building()?;
        self.check_mode("Cond", 0, Mode::I1, self.nodes[selector].mode)?;
        Ok(self.push_node(
            Opcode::Cond,
            Mode::T,
            block,
            smallvec![selector],
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_proj(
        &mut self,
        block: NodeRef,
        mode: Mode,
        tuple: NodeRef,
        index: u32,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        let tm = self.nodes[tuple].mode;
        if tm != Mode::T {
            return Err(Error::ModeMismatch {
                op: "Proj",
                slot: 0,
                expected: Mode::T,
                actual: tm,
            });
        }
        // Proj lives where its tuple-producing predecessor lives (spec.md
        // §4.4 edge cases); it is pinned to follow that predecessor.
        Ok(self.push_node(
            Opcode::Proj,
            mode,
            block,
            smallvec![tuple],
            PinState::PinnedToBlock,
            Attrs::ProjIndex(index),
        ))
    }

    pub fn new_load(
        &mut self,
        block: NodeRef,
        mem: NodeRef,
        addr: NodeRef,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        self.check_mode("Load", 0, Mode::M, self.nodes[mem].mode)?;
        self.check_mode("Load", 1, Mode::P, self.nodes[addr].mode)?;
        Ok(self.push_node(
            Opcode::Load,
            Mode::T,
            block,
            smallvec![mem, addr],
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_store(
        &mut self,
        block: NodeRef,
        mem: NodeRef,
        addr: NodeRef,
        value: NodeRef,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        self.check_mode("Store", 0, Mode::M, self.nodes[mem].mode)?;
        self.check_mode("Store", 1, Mode::P, self.nodes[addr].mode)?;
        Ok(self.push_node(
            Opcode::Store,
            Mode::M,
            block,
            smallvec![mem, addr, value],
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_call(
        &mut self,
        block: NodeRef,
        mem: NodeRef,
        target: NodeRef,
        args: &[NodeRef],
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        self.check_mode("Call", 0, Mode::M, self.nodes[mem].mode)?;
        let mut inputs: Inputs = smallvec![mem, target];
        inputs.extend(args.iter().copied());
        Ok(self.push_node(
            Opcode::Call,
            Mode::T,
            block,
            inputs,
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_return(
        &mut self,
        block: NodeRef,
        mem: NodeRef,
        results: &[NodeRef],
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        self.check_mode("Return", 0, Mode::M, self.nodes[mem].mode)?;
        let mut inputs: Inputs = smallvec![mem];
        inputs.extend(results.iter().copied());
        let n = self.push_node(
            Opcode::Return,
            Mode::X,
            block,
            inputs,
            PinState::PinnedToBlock,
            Attrs::None,
        );
        let slot = self.nodes[self.end].inputs.len() as i32;
        self.nodes[self.end].inputs.push(n);
        self.record_use(n, self.end, slot);
        // The Return is also a control-flow producer feeding EndBlock, so
        // EndBlock's own predecessor list (spec.md I2) accounts for it.
        self.add_pred(self.end_block, n)?;
        Ok(n)
    }

    pub fn new_bad(&mut self, block: NodeRef, mode: Mode) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::Bad,
            mode,
            block,
            Inputs::new(),
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_alloc(
        &mut self,
        block: NodeRef,
        mem: NodeRef,
        size: NodeRef,
        ty: TypeRef,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        self.check_mode("Alloc", 0, Mode::M, self.nodes[mem].mode)?;
        Ok(self.push_node(
            Opcode::Alloc,
            Mode::T,
            block,
            smallvec![mem, size],
            PinState::PinnedToBlock,
            Attrs::Type(ty),
        ))
    }

    pub fn new_free(
        &mut self,
        block: NodeRef,
        mem: NodeRef,
        ptr: NodeRef,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        self.check_mode("Free", 0, Mode::M, self.nodes[mem].mode)?;
        Ok(self.push_node(
            Opcode::Free,
            Mode::M,
            block,
            smallvec![mem, ptr],
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_sel(
        &mut self,
        block: NodeRef,
        mem: NodeRef,
        base: NodeRef,
        entity: EntityId,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        self.check_mode("Sel", 0, Mode::M, self.nodes[mem].mode)?;
        Ok(self.push_node(
            Opcode::Sel,
            Mode::P,
            block,
            smallvec![mem, base],
            PinState::PinnedToBlock,
            Attrs::Entity(entity),
        ))
    }

    pub fn new_sync(&mut self, block: NodeRef, mems: &[NodeRef]) -> Result<NodeRef, Error> {
        self.require_building()?;
        for (i, &m) in mems.iter().enumerate() {
            self.check_mode("Sync", i, Mode::M, self.nodes[m].mode)?;
        }
        Ok(self.push_node(
            Opcode::Sync,
            Mode::M,
            block,
            mems.iter().copied().collect(),
            PinState::Floats,
            Attrs::None,
        ))
    }

    // --- backend opcodes (spec.md §4.6), constructed by firm-abi ---

    pub fn new_inc_sp(
        &mut self,
        block: NodeRef,
        sp: NodeRef,
        bytes: i32,
        align: bool,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::IncSP,
            self.nodes[sp].mode,
            block,
            smallvec![sp],
            PinState::PinnedToBlock,
            Attrs::StackDelta { bytes, align },
        ))
    }

    /// `SubSP(sp, bytes)`: shrink the stack by a compile-time-constant
    /// byte count, used by `firm-abi`'s stack-allocation lowering
    /// (spec.md §4.6 "Alloc / Free lowering"). `bytes` is always
    /// non-negative here; `new_inc_sp` is the general signed-delta
    /// primitive this and `new_add_sp` specialize.
    pub fn new_sub_sp(&mut self, block: NodeRef, sp: NodeRef, bytes: u32, align: bool) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::SubSP,
            self.nodes[sp].mode,
            block,
            smallvec![sp],
            PinState::PinnedToBlock,
            Attrs::StackDelta { bytes: bytes as i32, align },
        ))
    }

    /// `AddSP(sp, bytes)`: grow the stack back by `bytes`, undoing a prior
    /// `SubSP` (spec.md §4.6's Free lowering).
    pub fn new_add_sp(&mut self, block: NodeRef, sp: NodeRef, bytes: u32, align: bool) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::AddSP,
            self.nodes[sp].mode,
            block,
            smallvec![sp],
            PinState::PinnedToBlock,
            Attrs::StackDelta { bytes: bytes as i32, align },
        ))
    }

    pub fn new_call_be(
        &mut self,
        block: NodeRef,
        sp: NodeRef,
        target: NodeRef,
        reg_args: &[NodeRef],
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        let mut inputs: Inputs = smallvec![sp, target];
        inputs.extend(reg_args.iter().copied());
        Ok(self.push_node(
            Opcode::CallBe,
            Mode::T,
            block,
            inputs,
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_keep(&mut self, block: NodeRef, kept: &[NodeRef]) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::Keep,
            Mode::X,
            block,
            kept.iter().copied().collect(),
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    pub fn new_mem_perm(&mut self, block: NodeRef, mem: NodeRef) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::MemPerm,
            Mode::M,
            block,
            smallvec![mem],
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    // --- register-allocator opcodes (spec.md §4.5), constructed by firm-regalloc ---

    /// `Spill(value)`: store `value` to a slot the spill-slot coalescer owns.
    /// Pinned at the point the Belady spiller decided the eviction happens.
    pub fn new_spill(&mut self, block: NodeRef, value: NodeRef) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::Spill,
            Mode::M,
            block,
            smallvec![value],
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    /// `Reload(spill)`: read a previously spilled value back into a
    /// register. `mode` is the reloaded value's own mode (the `Spill`
    /// input carries the memory-side-effect ordering, not the value type).
    pub fn new_reload(&mut self, block: NodeRef, mode: Mode, spill: NodeRef) -> Result<NodeRef, Error> {
        self.require_building()?;
        Ok(self.push_node(
            Opcode::Reload,
            mode,
            block,
            smallvec![spill],
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    /// `Copy(value)`: a register-to-register move, the thing copy
    /// coalescing tries to make unnecessary by co-allocating `value` and
    /// this node's result to the same register.
    pub fn new_copy(&mut self, block: NodeRef, value: NodeRef) -> Result<NodeRef, Error> {
        self.require_building()?;
        let mode = self.nodes[value].mode;
        Ok(self.push_node(
            Opcode::Copy,
            mode,
            block,
            smallvec![value],
            PinState::PinnedToBlock,
            Attrs::None,
        ))
    }

    // --- mutation API (spec.md §4.2) ---

    /// `set_input(node, i, v)`: single-edge update with use-list
    /// bookkeeping. `i == -1` rewrites the node's block.
    pub fn set_input(&mut self, node: NodeRef, i: i32, v: NodeRef) {
        let old = if i == -1 {
            let old = self.nodes[node].block;
            self.nodes[node].block = v;
            old
        } else {
            let old = self.nodes[node].inputs[i as usize];
            self.nodes[node].inputs[i as usize] = v;
            old
        };
        if old != v {
            self.remove_use(old, node, i);
            self.record_use(v, node, i);
        }
        if self.nodes[node].is_block() {
            self.refresh_dead(node);
        }
    }

    /// `exchange(old, new)`: redirect every user of `old` to `new`, then
    /// mark `old` as `Bad`. O(|uses of old|) via the inverted-edge index.
    /// `exchange(a, a)` is a documented no-op (spec.md §8 round-trip
    /// property).
    pub fn exchange(&mut self, old: NodeRef, new: NodeRef) {
        if old == new {
            return;
        }
        let users = self.uses.get(old).clone();
        for (user, slot) in users {
            if slot == -2 {
                // a keep-alive reference, not a normal input edge
                if let Some(pos) = self.keepalives.iter().position(|&k| k == old) {
                    self.keepalives[pos] = new;
                }
                self.record_use(new, self.end, -2);
                continue;
            }
            self.set_input(user, slot, new);
        }
        self.uses.ensure_set(old).clear();
        let mode = self.nodes[old].mode;
        self.nodes[old].opcode = Opcode::Bad;
        self.nodes[old].inputs = Inputs::new();
        self.nodes[old].mode = mode;
    }

    /// `finalize_construction(graph)`: transition to `constructed`, fix
    /// keep-alive edges for any nodes that became unreachable-but-must-live
    /// (endless loops, spec.md §8 boundary behavior), then assert I1-I7.
    pub fn finalize_construction(&mut self) -> Result<(), Error> {
        if !self.block_info.get(self.end_block).matured {
            self.mature_block(self.end_block)?;
        }
        self.state = ConstructionState::Constructed;
        crate::invariants::verify(self)?;
        log::debug!(
            "finalize_construction: {} nodes, {} keepalives",
            self.nodes.len(),
            self.keepalives.len()
        );
        Ok(())
    }

    pub(crate) fn invariant_err(&self, which: Invariant, node: NodeRef) -> Error {
        Error::InvariantViolation { which, node }
    }

    pub fn visit_counter_mut(&mut self) -> &mut VisitCounter<NodeRef> {
        &mut self.node_visited
    }

    pub fn resources_mut(&mut self) -> &mut ResourceLocks {
        &mut self.resources
    }

    // --- SSA (re-)construction support, used by firm-ssa ---

    /// Reopen a `constructed` graph for mutation: the backend calls this
    /// before `ssa_cons_start` when it needs to re-run SSA construction
    /// after inserting copies or splitting live ranges (spec.md §4.3
    /// "Re-SSA").
    pub fn reopen_for_building(&mut self) {
        self.state = ConstructionState::Building;
    }

    /// Reset every block's `matured` flag, as `ssa_cons_start` requires.
    /// Does not touch `dead`, since liveness of existing control edges is
    /// unaffected by re-running construction.
    pub fn reset_all_maturity(&mut self) {
        for n in self.nodes.keys().collect::<Vec<_>>() {
            if self.nodes[n].is_block() {
                self.block_info.ensure_set(n).matured = false;
            }
        }
    }

    /// Allocate a Phi with `arity` inputs, all initially the graph's
    /// canonical `Unknown` node for `mode`. Used by the SSA constructor to
    /// bind a Phi *before* its inputs are known, breaking recursive
    /// `get_value` cycles (spec.md §4.3 step 4).
    pub fn new_phi_placeholder(
        &mut self,
        block: NodeRef,
        mode: Mode,
        arity: usize,
    ) -> Result<NodeRef, Error> {
        self.require_building()?;
        let placeholder = self.unknown(mode);
        let inputs: Inputs = std::iter::repeat(placeholder).take(arity).collect();
        let n = self.nodes.push(Node {
            opcode: Opcode::Phi,
            mode,
            block,
            inputs,
            pin: PinState::PinnedToBlock,
            attrs: Attrs::None,
        });
        self.record_use(block, n, -1);
        for i in 0..arity {
            self.record_use(placeholder, n, i as i32);
        }
        Ok(n)
    }

    /// Turn a `Phi0` placeholder into a real `Phi` of the given arity,
    /// in place (same `NodeRef`, so anything that already referenced the
    /// `Phi0` — e.g. a nested immature-block cycle — stays valid without
    /// needing an `exchange`). Inputs start as `Unknown` and are filled in
    /// by the caller via `set_input`.
    pub fn promote_phi0_to_phi(&mut self, n: NodeRef, arity: usize) -> Result<(), Error> {
        self.require_building()?;
        let mode = self.nodes[n].mode;
        debug_assert_eq!(self.nodes[n].opcode, Opcode::Phi0);
        let placeholder = self.unknown(mode);
        self.nodes[n].opcode = Opcode::Phi;
        self.nodes[n].inputs = std::iter::repeat(placeholder).take(arity).collect();
        for i in 0..arity {
            self.record_use(placeholder, n, i as i32);
        }
        Ok(())
    }
}
