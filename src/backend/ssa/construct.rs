//! Crude SSA construction
//!
//! 1. Insert an empty phi for every temporary live-in at each block
//! 2. Give every definition a fresh version
//! 3. Rewrite uses to the nearest preceding definition in the block
//! 4. Fill phi arguments from the last definition in each predecessor
//!
//! The phi placement is not minimal; [`super::minimize`] cleans it up.

use crate::backend::cfg::ControlFlowGraph;
use crate::backend::error::BackendResult;
use crate::backend::liveness::LivenessAnalysis;
use crate::backend::names::NameGen;
use crate::tac::instr::{Instr, PhiEdge};
use crate::tac::types::{Label, Temp};
use std::collections::{BTreeMap, HashMap};

/// Convert the procedure to SSA form in place.
pub fn to_ssa(cfg: &mut ControlFlowGraph, names: &mut NameGen) -> BackendResult<()> {
    let liveness = LivenessAnalysis::analyze(cfg)?;

    // Original name of each phi's temporary, in block phi order
    let mut phi_roots: BTreeMap<Label, Vec<Temp>> = BTreeMap::new();
    let mut inserted = 0;
    for label in cfg.order().to_vec() {
        let live_in = liveness.live_in(&label);
        if let Some(block) = cfg.block_mut(&label) {
            let mut body: Vec<Instr> = live_in
                .iter()
                .map(|t| Instr::Phi {
                    dest: t.clone(),
                    args: BTreeMap::new(),
                })
                .collect();
            inserted += body.len();
            body.append(&mut block.body);
            block.body = body;
            phi_roots.insert(label, live_in.into_iter().collect());
        }
    }

    // Last version of each original temporary at the end of each block
    let mut last_def: BTreeMap<Label, HashMap<Temp, Temp>> = BTreeMap::new();
    cfg.for_each_block_mut(|block| {
        let mut current: HashMap<Temp, Temp> = HashMap::new();
        for instr in &mut block.body {
            instr.rename_uses(|t| current.get(t).cloned());
            if let Some(orig) = instr.def().cloned() {
                let new = names.fresh_version(&orig);
                instr.set_def(new.clone());
                current.insert(orig, new);
            }
        }
        last_def.insert(block.label.clone(), current);
    });

    let entry = cfg.entry().clone();
    let params = cfg.params.clone();
    for label in cfg.order().to_vec() {
        let preds = cfg.predecessors(&label).to_vec();
        let Some(roots) = phi_roots.get(&label) else {
            continue;
        };
        let Some(block) = cfg.block_mut(&label) else {
            continue;
        };
        for (phi, root) in block.body.iter_mut().zip(roots) {
            let Instr::Phi { args, .. } = phi else {
                continue;
            };
            for pred in &preds {
                if let Some(version) = last_def.get(pred).and_then(|defs| defs.get(root)) {
                    args.insert(PhiEdge::Block(pred.clone()), version.clone());
                }
            }
            if label == entry && params.contains(root) {
                args.insert(PhiEdge::Entry, root.clone());
            }
        }
    }

    log::debug!(
        "SSA for {}: {} phi(s) inserted, {} version(s)",
        cfg.name,
        inserted,
        names.versions()
    );
    Ok(())
}
