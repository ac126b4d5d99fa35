//! Dead Code Elimination Pass
//!
//! Removes instructions whose results are never used.
//!
//! # Algorithm
//!
//! 1. Run liveness analysis to get the live-out set of each instruction
//! 2. Drop every pure instruction whose destination temporary is not live-out
//! 3. Drop `nop`s and self-copies
//! 4. Repeat until nothing changes (removing dead code may expose more)
//!
//! # Side Effects
//!
//! The following are never removed:
//! - `div` and `mod`, which can trap
//! - `call`, `param`, `print` and control transfers
//! - any write to a global variable

use crate::backend::cfg::ControlFlowGraph;
use crate::backend::error::BackendResult;
use crate::backend::liveness::LivenessAnalysis;
use crate::tac::instr::Instr;
use crate::tac::types::{Temp, Var};
use im::OrdSet;

/// Eliminate dead code from a procedure.
///
/// Returns true if any instructions were removed.
pub fn eliminate_dead_code(cfg: &mut ControlFlowGraph) -> BackendResult<bool> {
    let mut changed = false;
    loop {
        let liveness = LivenessAnalysis::analyze(cfg)?;
        let mut removed = 0;
        cfg.for_each_block_mut(|block| {
            let Some(sets) = liveness.block(&block.label) else {
                return;
            };
            let before = block.body.len();
            let mut index = 0;
            block.body.retain(|instr| {
                let keep = match sets.instrs.get(index) {
                    Some(s) => should_keep_instruction(instr, &s.live_out),
                    None => true,
                };
                index += 1;
                keep
            });
            removed += before - block.body.len();
        });

        if removed == 0 {
            break;
        }
        log::trace!("{}: removed {} dead instruction(s)", cfg.name, removed);
        changed = true;
    }
    Ok(changed)
}

fn should_keep_instruction(instr: &Instr, live_out: &OrdSet<Temp>) -> bool {
    match instr {
        Instr::Nop => return false,
        Instr::Copy { dest, src } if dest == src => return false,
        _ => {}
    }
    if !instr.is_pure() {
        return true;
    }
    match instr.dest() {
        Some(Var::Global(_)) => true,
        _ => instr.def().is_some_and(|d| live_out.contains(d)),
    }
}
