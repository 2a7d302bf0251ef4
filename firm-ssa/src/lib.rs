//! C3: on-demand SSA construction (spec.md §4.3).
//!
//! Grounded on `cranelift-frontend/src/frontend.rs`'s
//! `FunctionBuilder`/`FunctionBuilderContext` split — a context struct whose
//! allocations are reused across functions (here: across re-SSA passes) and
//! a per-construction builder that borrows it — and on the Braun-et-al.
//! construction algorithm that file implements via `use_var`/`declare_var`.
//! Re-targeted at spec.md's `var_id: u32` / `get_value(var_id, mode)`
//! surface, with the `ssa_cons_start`/`ssa_cons_finish` bracketing the
//! teacher's one-shot frontend doesn't need.

use firm_ir::{Error, Graph, Mode, NodeRef, Opcode, VarId};
use std::collections::HashMap;

/// Per-(block, variable) bindings plus the set of not-yet-finalized `Phi0`
/// placeholders, reusable across successive construction passes the way the
/// teacher's `FunctionBuilderContext` is reusable across functions.
pub struct SsaBuilder {
    /// `(block, var) -> bound value`.
    defs: HashMap<(NodeRef, VarId), NodeRef>,
    /// Per-immature-block list of `(var, phi0_node)` awaiting `mature_block`.
    pending: HashMap<NodeRef, Vec<(VarId, NodeRef)>>,
}

impl SsaBuilder {
    pub fn new() -> Self {
        Self {
            defs: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty() && self.pending.is_empty()
    }

    fn clear(&mut self) {
        self.defs.clear();
        self.pending.clear();
    }

    /// Bracket the start of a (re-)construction pass: `n_vars` is
    /// informational (front-ends use it to presize storage; kept for
    /// parity with spec.md's signature). Resets every block's `matured`
    /// flag and reopens the graph for mutation, enabling the backend's
    /// re-SSA use case (spec.md §4.3 "Re-SSA").
    pub fn ssa_cons_start(&mut self, graph: &mut Graph, _n_vars: usize) {
        self.clear();
        graph.reopen_for_building();
        graph.reset_all_maturity();
        log::debug!("ssa_cons_start: reopened graph for (re-)construction");
    }

    /// Bracket the end of a (re-)construction pass: re-finalizes the graph
    /// (re-asserts I1-I7).
    pub fn ssa_cons_finish(&mut self, graph: &mut Graph) -> Result<(), Error> {
        graph.finalize_construction()?;
        log::debug!("ssa_cons_finish: graph re-finalized");
        Ok(())
    }

    /// `set_value(var_id, value)`: bind `var` to `value` in `block`.
    pub fn set_value(&mut self, graph: &Graph, block: NodeRef, var: VarId, value: NodeRef) -> Result<(), Error> {
        require_building(graph)?;
        self.defs.insert((block, var), value);
        Ok(())
    }

    /// `get_value(var_id, mode)`: read `var` as seen from `block`,
    /// inserting Phis on demand (spec.md §4.3's four-step algorithm).
    pub fn get_value(
        &mut self,
        graph: &mut Graph,
        block: NodeRef,
        var: VarId,
        mode: Mode,
    ) -> Result<NodeRef, Error> {
        require_building(graph)?;
        self.get_value_in_block(graph, block, var, mode)
    }

    fn get_value_in_block(
        &mut self,
        graph: &mut Graph,
        block: NodeRef,
        var: VarId,
        mode: Mode,
    ) -> Result<NodeRef, Error> {
        // Step 1: already bound in this block.
        if let Some(&v) = self.defs.get(&(block, var)) {
            return Ok(v);
        }

        // Step 2: immature block — install a Phi0 placeholder, defer
        // resolution to `mature_block`.
        if !graph.is_matured(block) {
            let phi0 = graph.new_phi0(block, mode, var)?;
            self.defs.insert((block, var), phi0);
            self.pending.entry(block).or_default().push((var, phi0));
            log::trace!("get_value: installed Phi0 for {:?} in {}", var, block);
            return Ok(phi0);
        }

        let preds = graph.node(block).inputs.clone();

        // Step 3: matured, exactly one predecessor — recurse, no Phi
        // needed.
        if preds.len() == 1 {
            let pred_block = graph.node(preds[0]).block;
            let v = self.get_value_in_block(graph, pred_block, var, mode)?;
            self.defs.insert((block, var), v);
            return Ok(v);
        }

        // Step 3b (not in spec.md's numbered list but required for
        // correctness): a matured block with zero predecessors has no
        // definition to inherit. Per the failure model in spec.md §4.3,
        // an unset variable reads as the graph's canonical `Unknown`.
        if preds.is_empty() {
            let v = graph.unknown(mode);
            self.defs.insert((block, var), v);
            return Ok(v);
        }

        // Step 4: matured, multiple predecessors — insert a Phi with one
        // input per predecessor, binding it before recursing so that a
        // cyclic `get_value` (a loop header reading its own loop-carried
        // variable) terminates instead of recursing forever.
        let phi = graph.new_phi_placeholder(block, mode, preds.len())?;
        self.defs.insert((block, var), phi);
        let resolved = self.fill_phi_inputs(graph, phi, &preds, var, mode)?;
        self.defs.insert((block, var), resolved);
        Ok(resolved)
    }

    /// Fill `phi`'s inputs by recursing into each of `preds`' owning
    /// blocks, then attempt trivial-Phi removal.
    fn fill_phi_inputs(
        &mut self,
        graph: &mut Graph,
        phi: NodeRef,
        preds: &[NodeRef],
        var: VarId,
        mode: Mode,
    ) -> Result<NodeRef, Error> {
        for (i, &pred_producer) in preds.iter().enumerate() {
            let pred_block = graph.node(pred_producer).block;
            let v = self.get_value_in_block(graph, pred_block, var, mode)?;
            graph.set_input(phi, i as i32, v);
        }
        self.try_remove_trivial_phi(graph, phi)
    }

    /// `mature_block(block)`: resolve every pending `Phi0` recorded for
    /// `block` by executing step 4 for its variable, then seal the
    /// predecessor list.
    pub fn mature_block(&mut self, graph: &mut Graph, block: NodeRef) -> Result<(), Error> {
        require_building(graph)?;
        if let Some(pending) = self.pending.remove(&block) {
            let preds = graph.node(block).inputs.clone();
            for (var, phi0) in pending {
                let mode = graph.node(phi0).mode;
                let resolved = if preds.is_empty() {
                    let v = graph.unknown(mode);
                    graph.exchange(phi0, v);
                    v
                } else if preds.len() == 1 {
                    let pred_block = graph.node(preds[0]).block;
                    let v = self.get_value_in_block(graph, pred_block, var, mode)?;
                    graph.exchange(phi0, v);
                    v
                } else {
                    graph.promote_phi0_to_phi(phi0, preds.len())?;
                    self.fill_phi_inputs(graph, phi0, &preds, var, mode)?
                };
                self.defs.insert((block, var), resolved);
            }
        }
        graph.mature_block(block)?;
        Ok(())
    }

    /// `try_remove_trivial_phi`: if all of `phi`'s non-self inputs equal a
    /// single value `x` (or there are no non-self inputs at all), replace
    /// `phi` with `x` and recursively re-check any Phi that used `phi` as
    /// one of its own inputs, since removing `phi` may make those trivial
    /// too.
    fn try_remove_trivial_phi(&mut self, graph: &mut Graph, phi: NodeRef) -> Result<NodeRef, Error> {
        let inputs = graph.node(phi).inputs.clone();
        let mut same: Option<NodeRef> = None;
        for &input in &inputs {
            if input == phi || Some(input) == same {
                continue;
            }
            if same.is_some() {
                // More than one distinct non-self input: genuinely needed.
                return Ok(phi);
            }
            same = Some(input);
        }
        let replacement = match same {
            Some(v) => v,
            // A Phi whose only "inputs" are itself (an unreachable loop
            // header never fed a real value) reads as Unknown.
            None => graph.unknown(graph.node(phi).mode),
        };

        // Collect Phi users before `exchange` clears `phi`'s use-list.
        let phi_users: Vec<NodeRef> = graph
            .uses_of(phi)
            .iter()
            .filter(|&&(user, slot)| slot >= 0 && graph.node(user).opcode == Opcode::Phi)
            .map(|&(user, _)| user)
            .collect();

        graph.exchange(phi, replacement);
        log::trace!("try_remove_trivial_phi: {} -> {}", phi, replacement);

        for user in phi_users {
            if user != replacement {
                self.try_remove_trivial_phi(graph, user)?;
            }
        }
        Ok(replacement)
    }
}

impl Default for SsaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn require_building(graph: &Graph) -> Result<(), Error> {
    if graph.state() != firm_ir::ConstructionState::Building {
        return Err(Error::NotBuilding);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use firm_entity::EntityRef;
    use firm_ir::{EntityId, Linkage, Signature, TypeGraph, TypeKind, Visibility};

    fn new_graph() -> (TypeGraph, Graph) {
        let mut tg = TypeGraph::new();
        let frame = tg.new_type(TypeKind::Frame {
            members: vec![],
            size: 0,
            align: 8,
        });
        let owner = tg.new_type(TypeKind::Aggregate {
            members: vec![],
            size: 0,
            align: 1,
        });
        let sig = tg.new_type(TypeKind::Method(Signature {
            params: vec![],
            results: vec![Mode::I32],
        }));
        let entity: EntityId = tg.new_entity("f", owner, sig, Linkage::Local, Visibility::Public);
        let graph = Graph::new_graph(entity, frame, 1);
        (tg, graph)
    }

    #[test]
    fn straight_line_no_phis() {
        // Seed scenario 2: x := 1; x := x + 2; return x; generates no Phis.
        let (_tg, mut g) = new_graph();
        let mut ssa = SsaBuilder::new();
        let var = VarId::new(0);

        let one = g.new_const(g.start_block, Mode::I32, 1).unwrap();
        ssa.set_value(&g, g.start_block, var, one).unwrap();

        let x = ssa.get_value(&mut g, g.start_block, var, Mode::I32).unwrap();
        let two = g.new_const(g.start_block, Mode::I32, 2).unwrap();
        let sum = g.new_add(g.start_block, x, two).unwrap();
        ssa.set_value(&g, g.start_block, var, sum).unwrap();

        let result = ssa.get_value(&mut g, g.start_block, var, Mode::I32).unwrap();
        assert_eq!(g.node(result).opcode, Opcode::Add);

        for n in g.node_refs() {
            assert_ne!(g.node(n).opcode, Opcode::Phi);
        }
    }

    #[test]
    fn phi_inserted_at_diamond_join() {
        // Seed scenario 3: a diamond CFG assigning different values on each
        // arm yields a Phi with the arm values as inputs, in predecessor
        // order.
        let (_tg, mut g) = new_graph();
        let mut ssa = SsaBuilder::new();
        let var = VarId::new(0);

        let left = g.new_block(&[]).unwrap();
        let right = g.new_block(&[]).unwrap();
        let left_jmp = g.new_jmp(left).unwrap();
        let right_jmp = g.new_jmp(right).unwrap();
        g.mature_block(left).unwrap();
        g.mature_block(right).unwrap();

        let join = g.new_block(&[left_jmp, right_jmp]).unwrap();

        let ten = g.new_const(left, Mode::I32, 10).unwrap();
        ssa.set_value(&g, left, var, ten).unwrap();
        let twenty = g.new_const(right, Mode::I32, 20).unwrap();
        ssa.set_value(&g, right, var, twenty).unwrap();

        g.mature_block(join).unwrap();
        let merged = ssa.get_value(&mut g, join, var, Mode::I32).unwrap();

        assert_eq!(g.node(merged).opcode, Opcode::Phi);
        assert_eq!(g.node(merged).inputs.as_slice(), &[ten, twenty]);
    }

    #[test]
    fn trivial_phi_removed_at_loop_header() {
        // Seed scenario 4: a loop header whose predecessors all supply the
        // same value for a variable collapses to that value; no Phi
        // remains.
        let (_tg, mut g) = new_graph();
        let mut ssa = SsaBuilder::new();
        let var = VarId::new(0);

        let forty_two = g.new_const(g.start_block, Mode::I32, 42).unwrap();
        ssa.set_value(&g, g.start_block, var, forty_two).unwrap();
        let entry_jmp = g.new_jmp(g.start_block).unwrap();

        // An immature loop header with one known predecessor (entry); the
        // back-edge is appended before maturity, as a real front-end would
        // (the loop body is discovered after the header itself).
        let header = g.new_block(&[entry_jmp]).unwrap();
        let v_in_header = ssa.get_value(&mut g, header, var, Mode::I32).unwrap();
        // Reading before maturity installs a Phi0.
        assert_eq!(g.node(v_in_header).opcode, Opcode::Phi0);

        // The loop body doesn't redefine the variable; the back-edge
        // carries the same binding forward.
        ssa.set_value(&g, header, var, v_in_header).unwrap();
        let back_edge = g.new_jmp(header).unwrap();
        g.add_pred(header, back_edge).unwrap();
        ssa.mature_block(&mut g, header).unwrap();

        let resolved = ssa.get_value(&mut g, header, var, Mode::I32).unwrap();
        assert_eq!(resolved, forty_two);
        for n in g.node_refs() {
            assert_ne!(g.node(n).opcode, Opcode::Phi);
            assert_ne!(g.node(n).opcode, Opcode::Phi0);
        }
    }
}
