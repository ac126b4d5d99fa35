//! SSA Conversion
//!
//! Crude construction followed by optional minimization, plus checks for the
//! properties SSA form must satisfy.

mod construct;
mod minimize;

pub use construct::to_ssa;
pub use minimize::{MinimizeStats, minimize};

use super::cfg::ControlFlowGraph;
use super::error::{BackendError, BackendResult};
use crate::tac::instr::{Instr, PhiEdge};
use crate::tac::types::Temp;
use std::collections::{BTreeSet, HashSet};

/// Whether any block already starts with phis
pub fn has_phis(cfg: &ControlFlowGraph) -> bool {
    cfg.blocks().any(|b| b.phi_count() > 0)
}

/// Every temporary has at most one definition, and parameters have none.
pub fn check_single_definition(cfg: &ControlFlowGraph) -> BackendResult<()> {
    let mut defined: HashSet<&Temp> = cfg.params.iter().collect();
    for block in cfg.blocks() {
        for instr in &block.body {
            if let Some(d) = instr.def()
                && !defined.insert(d)
            {
                return Err(BackendError::unreachable(format!(
                    "{} is defined more than once in {}",
                    d, cfg.name
                )));
            }
        }
    }
    Ok(())
}

/// Every phi has exactly one argument per predecessor edge, plus at most the
/// synthetic `entry` edge in the entry block.
pub fn check_phi_completeness(cfg: &ControlFlowGraph) -> BackendResult<()> {
    for block in cfg.blocks() {
        let preds: BTreeSet<PhiEdge> = cfg
            .predecessors(&block.label)
            .iter()
            .map(|p| PhiEdge::Block(p.clone()))
            .collect();
        for phi in block.phis() {
            let Instr::Phi { dest, args } = phi else {
                continue;
            };
            let mut edges: BTreeSet<PhiEdge> = args.keys().cloned().collect();
            if block.label == *cfg.entry() {
                edges.remove(&PhiEdge::Entry);
            }
            if edges != preds {
                return Err(BackendError::unreachable(format!(
                    "phi for {} in {} does not match the predecessors of its block",
                    dest, block.label
                )));
            }
        }
    }
    Ok(())
}
