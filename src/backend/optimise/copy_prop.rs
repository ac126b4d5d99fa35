//! Copy Propagation Pass
//!
//! Replaces uses of a temporary defined by `%d = copy %s` with `%s`.
//!
//! # Algorithm
//!
//! - Raw TAC: forward walk within each block, tracking `CopyMap: d -> s`. A
//!   definition of either side invalidates the entry. The map is cleared at
//!   every block entry.
//! - SSA form: a copy whose destination and source each have at most one
//!   definition holds everywhere, so every use in the procedure (phi arguments
//!   included) is rewritten.
//!
//! The copies themselves are left for dead-code elimination.

use crate::backend::cfg::{BasicBlock, ControlFlowGraph};
use crate::tac::instr::Instr;
use crate::tac::types::{Temp, Var};
use std::collections::HashMap;

/// Copy map: destination temporary -> source temporary
type CopyMap = HashMap<Temp, Temp>;

/// Apply copy propagation to a procedure.
///
/// Returns true if any use was rewritten.
pub fn copy_propagate(cfg: &mut ControlFlowGraph, ssa: bool) -> bool {
    let mut changed = false;
    if ssa {
        changed |= propagate_global(cfg);
    } else {
        cfg.for_each_block_mut(|block| changed |= propagate_block(block));
    }
    changed
}

fn temp_copy(instr: &Instr) -> Option<(&Temp, &Temp)> {
    match instr {
        Instr::Copy {
            dest: Var::Temp(d),
            src: Var::Temp(s),
        } if !d.is_sink() && !s.is_sink() && d != s => Some((d, s)),
        _ => None,
    }
}

/// Follow the copy chain to its original source
fn resolve(temp: &Temp, copy_map: &CopyMap) -> Temp {
    let mut current = temp.clone();
    // Bounded by the map size in case of a cycle
    for _ in 0..=copy_map.len() {
        match copy_map.get(&current) {
            Some(src) if *src != current => current = src.clone(),
            _ => break,
        }
    }
    current
}

fn propagate_block(block: &mut BasicBlock) -> bool {
    let mut changed = false;
    let mut copy_map: CopyMap = HashMap::new();

    for instr in &mut block.body {
        instr.rename_uses(|t| {
            let src = resolve(t, &copy_map);
            if src != *t {
                changed = true;
                Some(src)
            } else {
                None
            }
        });

        if let Some(d) = instr.def() {
            copy_map.remove(d);
            copy_map.retain(|_, src| src != d);
        }
        if let Some((d, s)) = temp_copy(instr) {
            copy_map.insert(d.clone(), s.clone());
        }
    }

    changed
}

fn propagate_global(cfg: &mut ControlFlowGraph) -> bool {
    let mut defs: HashMap<Temp, usize> = HashMap::new();
    for p in &cfg.params {
        *defs.entry(p.clone()).or_default() += 1;
    }
    for block in cfg.blocks() {
        for instr in &block.body {
            if let Some(d) = instr.def() {
                *defs.entry(d.clone()).or_default() += 1;
            }
        }
    }
    let single = |t: &Temp| defs.get(t).copied().unwrap_or(0) <= 1;

    let mut copy_map: CopyMap = HashMap::new();
    for block in cfg.blocks() {
        for instr in &block.body {
            if let Some((d, s)) = temp_copy(instr)
                && single(d)
                && single(s)
            {
                copy_map.insert(d.clone(), s.clone());
            }
        }
    }
    if copy_map.is_empty() {
        return false;
    }

    let mut changed = false;
    cfg.for_each_block_mut(|block| {
        for instr in &mut block.body {
            instr.rename_uses(|t| {
                let src = resolve(t, &copy_map);
                if src != *t {
                    changed = true;
                    Some(src)
                } else {
                    None
                }
            });
            if let Instr::Phi { args, .. } = instr {
                for arg in args.values_mut() {
                    let src = resolve(arg, &copy_map);
                    if src != *arg {
                        *arg = src;
                        changed = true;
                    }
                }
            }
        }
    });
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::names::NameGen;
    use crate::tac::instr::{BinOp, PhiEdge};
    use crate::tac::program::Proc;
    use crate::tac::types::{Global, Label};

    fn tv(name: &str) -> Var {
        Var::Temp(Temp::new(name))
    }

    fn cfg_of(params: Vec<Temp>, body: Vec<Instr>) -> ControlFlowGraph {
        let proc = Proc::new("p", params, body);
        ControlFlowGraph::build(&proc, &mut NameGen::new(&[])).unwrap()
    }

    fn body(cfg: &ControlFlowGraph) -> Vec<String> {
        cfg.instrs().iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_copy_chain_in_block() {
        let mut cfg = cfg_of(
            vec![],
            vec![
                Instr::Const { dest: tv("a"), value: 42 },
                Instr::Copy { dest: tv("b"), src: tv("a") },
                Instr::Copy { dest: tv("c"), src: tv("b") },
                Instr::Print { arg: tv("c") },
            ],
        );
        assert!(copy_propagate(&mut cfg, false));
        assert_eq!(
            body(&cfg),
            vec!["%a = const 42;", "%b = copy %a;", "%c = copy %a;", "print %a;"]
        );
        assert!(!copy_propagate(&mut cfg, false));
    }

    #[test]
    fn test_redefinition_invalidates() {
        let mut cfg = cfg_of(
            vec![Temp::new("x")],
            vec![
                Instr::Copy { dest: tv("y"), src: tv("x") },
                Instr::Binary {
                    op: BinOp::Add,
                    dest: tv("x"),
                    lhs: tv("x"),
                    rhs: tv("y"),
                },
                Instr::Print { arg: tv("y") },
            ],
        );
        copy_propagate(&mut cfg, false);
        assert_eq!(
            body(&cfg),
            vec!["%y = copy %x;", "%x = add %x, %x;", "print %y;"]
        );
    }

    #[test]
    fn test_globals_not_propagated() {
        let g = Var::Global(Global::new("g"));
        let mut cfg = cfg_of(
            vec![],
            vec![
                Instr::Copy { dest: tv("y"), src: g.clone() },
                Instr::Copy { dest: g, src: tv("z") },
                Instr::Print { arg: tv("y") },
            ],
        );
        assert!(!copy_propagate(&mut cfg, false));
    }

    #[test]
    fn test_ssa_propagates_across_blocks_and_phis() {
        let a1 = Temp::versioned("a", 1);
        let b2 = Temp::versioned("b", 2);
        let phi = Instr::Phi {
            dest: Temp::versioned("c", 3),
            args: [(PhiEdge::Block(Label::new("x")), b2.clone())]
                .into_iter()
                .collect(),
        };
        let mut cfg = cfg_of(
            vec![],
            vec![
                Instr::Label(Label::new("x")),
                Instr::Const { dest: Var::Temp(a1.clone()), value: 1 },
                Instr::Copy {
                    dest: Var::Temp(b2.clone()),
                    src: Var::Temp(a1.clone()),
                },
                Instr::Label(Label::new("y")),
                phi,
                Instr::Print { arg: Var::Temp(b2.clone()) },
            ],
        );
        copy_propagate(&mut cfg, true);
        assert_eq!(
            body(&cfg),
            vec![
                ".Lx:",
                "%a.1 = const 1;",
                "%b.2 = copy %a.1;",
                ".Ly:",
                "%c.3 = phi (.Lx: %a.1);",
                "print %a.1;",
            ]
        );
    }
}
