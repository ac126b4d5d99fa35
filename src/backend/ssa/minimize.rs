//! SSA minimization
//!
//! Removes the redundant phis left by crude construction. Each round runs:
//!
//! - null-choice elimination: drop phis whose arguments are all the phi itself
//! - collapse: a phi with one distinct source becomes `dest = copy src`
//! - rename elimination: replace the copy's destination by its source everywhere
//!
//! Rounds repeat until nothing changes.

use crate::backend::cfg::ControlFlowGraph;
use crate::tac::instr::{Instr, PhiEdge};
use crate::tac::types::{Label, Temp, Var};
use std::collections::{BTreeMap, BTreeSet};

/// Counts of what minimization removed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MinimizeStats {
    pub rounds: usize,
    pub null_choices: usize,
    pub collapsed: usize,
}

pub fn minimize(cfg: &mut ControlFlowGraph) -> MinimizeStats {
    let mut stats = MinimizeStats::default();
    loop {
        stats.rounds += 1;
        let removed = eliminate_null_choices(cfg);
        let copies = collapse_single_source(cfg);
        let collapsed = copies.len();
        eliminate_renames(cfg, copies);

        stats.null_choices += removed;
        stats.collapsed += collapsed;
        log::trace!(
            "{}: minimization round {} removed {} null choice(s), collapsed {} phi(s)",
            cfg.name,
            stats.rounds,
            removed,
            collapsed
        );
        if removed == 0 && collapsed == 0 {
            break;
        }
    }

    for block in cfg.blocks() {
        for phi in block.phis() {
            if let Instr::Phi { dest, args } = phi
                && args.is_empty()
            {
                log::warn!("{}: phi for {} in {} has no incoming edges", cfg.name, dest, block.label);
            }
        }
    }
    log::debug!(
        "minimized SSA for {}: {} null choice(s), {} collapsed, {} round(s)",
        cfg.name,
        stats.null_choices,
        stats.collapsed,
        stats.rounds
    );
    stats
}

fn eliminate_null_choices(cfg: &mut ControlFlowGraph) -> usize {
    let mut removed = 0;
    cfg.for_each_block_mut(|block| {
        let before = block.body.len();
        block.body.retain(|instr| match instr {
            Instr::Phi { dest, args } => args.is_empty() || args.values().any(|a| a != dest),
            _ => true,
        });
        removed += before - block.body.len();
    });
    removed
}

/// The single source of a phi other than itself, if there is exactly one.
fn single_source(dest: &Temp, args: &BTreeMap<PhiEdge, Temp>) -> Option<Temp> {
    let sources: BTreeSet<&Temp> = args.values().filter(|a| *a != dest).collect();
    match sources.len() {
        1 => sources.into_iter().next().cloned(),
        _ => None,
    }
}

/// Replace single-source phis by copies after the phi group. Returns the block
/// and destination of every copy introduced.
fn collapse_single_source(cfg: &mut ControlFlowGraph) -> Vec<(Label, Temp)> {
    let mut copies = Vec::new();
    cfg.for_each_block_mut(|block| {
        let phi_count = block.phi_count();
        let mut kept = Vec::with_capacity(phi_count);
        let mut collapsed = Vec::new();
        for instr in block.body.drain(..phi_count) {
            let source = match &instr {
                Instr::Phi { dest, args } => single_source(dest, args).map(|s| (dest.clone(), s)),
                _ => None,
            };
            match source {
                Some((dest, src)) => collapsed.push(Instr::Copy {
                    dest: Var::Temp(dest),
                    src: Var::Temp(src),
                }),
                None => kept.push(instr),
            }
        }
        for copy in &collapsed {
            if let Some(d) = copy.def() {
                copies.push((block.label.clone(), d.clone()));
            }
        }
        kept.extend(collapsed);
        kept.append(&mut block.body);
        block.body = kept;
    });
    copies
}

/// Substitute each introduced copy's source for its destination and delete it.
fn eliminate_renames(cfg: &mut ControlFlowGraph, copies: Vec<(Label, Temp)>) {
    for (label, dest) in copies {
        // Earlier substitutions may have rewritten the source
        let Some(block) = cfg.block_mut(&label) else {
            continue;
        };
        let Some(pos) = block
            .body
            .iter()
            .position(|i| matches!(i, Instr::Copy { dest: Var::Temp(d), .. } if *d == dest))
        else {
            continue;
        };
        let src = match block.body.remove(pos) {
            Instr::Copy { src: Var::Temp(s), .. } => s,
            _ => continue,
        };
        if src == dest {
            continue;
        }
        substitute(cfg, &dest, &src);
    }
}

fn substitute(cfg: &mut ControlFlowGraph, from: &Temp, to: &Temp) {
    cfg.for_each_block_mut(|block| {
        for instr in &mut block.body {
            instr.rename_uses(|t| (t == from).then(|| to.clone()));
            if let Instr::Phi { args, .. } = instr {
                for arg in args.values_mut() {
                    if arg == from {
                        *arg = to.clone();
                    }
                }
            }
        }
    });
}
