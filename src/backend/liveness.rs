//! Liveness Analysis
//!
//! Backward dataflow over the CFG. Computes live-in and live-out sets for every
//! block and every instruction.
//!
//! A phi reads its argument on the incoming edge: the argument is live-out of the
//! matching predecessor and is not live-in of the phi's own block. The leading
//! phis of a block form one parallel group sharing the same live-out set.

use super::cfg::{BasicBlock, ControlFlowGraph};
use super::error::{BackendError, BackendResult};
use crate::tac::instr::{Instr, PhiEdge};
use crate::tac::types::{Label, Temp};
use im::OrdSet;
use std::collections::BTreeMap;

/// Live sets around one instruction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstrLiveness {
    pub live_in: OrdSet<Temp>,
    pub live_out: OrdSet<Temp>,
}

/// Live sets of one block, with one entry per body instruction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockLiveness {
    pub live_in: OrdSet<Temp>,
    pub live_out: OrdSet<Temp>,
    pub instrs: Vec<InstrLiveness>,
}

/// Result of liveness analysis for one procedure
#[derive(Clone, Debug)]
pub struct LivenessAnalysis {
    blocks: BTreeMap<Label, BlockLiveness>,
    entry_live: OrdSet<Temp>,
    rounds: usize,
}

impl LivenessAnalysis {
    pub fn analyze(cfg: &ControlFlowGraph) -> BackendResult<Self> {
        let mut blocks: BTreeMap<Label, BlockLiveness> = cfg
            .order()
            .iter()
            .map(|l| (l.clone(), BlockLiveness::default()))
            .collect();

        let bound = cfg.order().len() * (cfg.temps().len() + 1) + 2;
        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > bound {
                return Err(BackendError::unreachable(format!(
                    "liveness of {} did not converge after {} rounds",
                    cfg.name, bound
                )));
            }

            let mut changed = false;
            for label in cfg.order().iter().rev() {
                let Some(block) = cfg.block(label) else {
                    continue;
                };

                let mut live_out = OrdSet::new();
                for succ in cfg.successors(label) {
                    if let Some(s) = blocks.get(succ) {
                        live_out = live_out.union(s.live_in.clone());
                    }
                    if let Some(s) = cfg.block(succ) {
                        live_out.extend(phi_args_from(s, label).cloned());
                    }
                }

                let result = transfer(block, live_out);
                if let Some(old) = blocks.get(label)
                    && *old != result
                {
                    changed = true;
                }
                blocks.insert(label.clone(), result);
            }

            if !changed {
                break;
            }
        }

        let mut entry_live = blocks
            .get(cfg.entry())
            .map(|b| b.live_in.clone())
            .unwrap_or_default();
        if let Some(entry) = cfg.block(cfg.entry()) {
            for phi in entry.phis() {
                if let Instr::Phi { args, .. } = phi
                    && let Some(arg) = args.get(&PhiEdge::Entry)
                {
                    entry_live.insert(arg.clone());
                }
            }
        }

        log::debug!(
            "liveness for {} converged after {} round(s)",
            cfg.name,
            rounds
        );
        Ok(Self {
            blocks,
            entry_live,
            rounds,
        })
    }

    pub fn block(&self, label: &Label) -> Option<&BlockLiveness> {
        self.blocks.get(label)
    }

    /// Live sets around instruction `index` of the block body
    pub fn instr(&self, label: &Label, index: usize) -> Option<&InstrLiveness> {
        self.blocks.get(label).and_then(|b| b.instrs.get(index))
    }

    pub fn live_in(&self, label: &Label) -> OrdSet<Temp> {
        self.blocks
            .get(label)
            .map(|b| b.live_in.clone())
            .unwrap_or_default()
    }

    pub fn live_out(&self, label: &Label) -> OrdSet<Temp> {
        self.blocks
            .get(label)
            .map(|b| b.live_out.clone())
            .unwrap_or_default()
    }

    /// Temporaries whose value must be present when the procedure is entered
    pub fn entry_live(&self) -> &OrdSet<Temp> {
        &self.entry_live
    }

    /// Number of passes over the CFG until the sets were stable
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

/// Arguments of `block`'s phis flowing in along the edge from `pred`
pub fn phi_args_from<'a>(block: &'a BasicBlock, pred: &'a Label) -> impl Iterator<Item = &'a Temp> {
    let edge = PhiEdge::Block(pred.clone());
    block.phis().filter_map(move |phi| match phi {
        Instr::Phi { args, .. } => args.get(&edge),
        _ => None,
    })
}

/// Run the backward recurrence over one block, seeded by its live-out set.
fn transfer(block: &BasicBlock, live_out: OrdSet<Temp>) -> BlockLiveness {
    let n = block.body.len();
    let phi_count = block.phi_count();
    let mut instrs = vec![InstrLiveness::default(); n];

    let mut live = live_out.clone();
    for i in (phi_count..n).rev() {
        let instr = &block.body[i];
        let out = live.clone();
        if let Some(d) = instr.def() {
            live.remove(d);
        }
        for u in instr.uses() {
            live.insert(u.clone());
        }
        instrs[i] = InstrLiveness {
            live_in: live.clone(),
            live_out: out,
        };
    }

    if phi_count > 0 {
        let group_out = live.clone();
        for phi in &block.body[..phi_count] {
            if let Some(d) = phi.def() {
                live.remove(d);
            }
        }
        for slot in &mut instrs[..phi_count] {
            *slot = InstrLiveness {
                live_in: live.clone(),
                live_out: group_out.clone(),
            };
        }
    }

    BlockLiveness {
        live_in: live,
        live_out,
        instrs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::names::NameGen;
    use crate::tac::instr::{BinOp, Cond};
    use crate::tac::program::Proc;
    use crate::tac::types::Var;

    fn t(name: &str) -> Temp {
        Temp::new(name)
    }

    fn tv(name: &str) -> Var {
        Var::Temp(t(name))
    }

    fn set(names: &[&str]) -> OrdSet<Temp> {
        names.iter().map(|n| t(n)).collect()
    }

    fn analyze(params: Vec<Temp>, body: Vec<Instr>) -> (ControlFlowGraph, LivenessAnalysis) {
        let proc = Proc::new("p", params, body);
        let mut names = NameGen::new(&[]);
        let cfg = ControlFlowGraph::build(&proc, &mut names).unwrap();
        let live = LivenessAnalysis::analyze(&cfg).unwrap();
        (cfg, live)
    }

    #[test]
    fn test_straight_line() {
        let (cfg, live) = analyze(
            vec![],
            vec![
                Instr::Const { dest: tv("0"), value: 5 },
                Instr::Const { dest: tv("1"), value: 7 },
                Instr::Binary {
                    op: BinOp::Add,
                    dest: tv("2"),
                    lhs: tv("0"),
                    rhs: tv("1"),
                },
                Instr::Print { arg: tv("2") },
            ],
        );
        let entry = cfg.entry();
        assert!(live.live_in(entry).is_empty());
        assert_eq!(live.instr(entry, 1).unwrap().live_out, set(&["0", "1"]));
        assert_eq!(live.instr(entry, 2).unwrap().live_out, set(&["2"]));
        assert!(live.instr(entry, 3).unwrap().live_out.is_empty());
    }

    #[test]
    fn test_loop_carries_values() {
        // %n counts down to zero, %s accumulates
        let (cfg, live) = analyze(
            vec![t("n")],
            vec![
                Instr::Const { dest: tv("s"), value: 0 },
                Instr::Label(Label::new("head")),
                Instr::Branch {
                    cond: Cond::Z,
                    arg: tv("n"),
                    target: Label::new("exit"),
                },
                Instr::Binary {
                    op: BinOp::Add,
                    dest: tv("s"),
                    lhs: tv("s"),
                    rhs: tv("n"),
                },
                Instr::Binary {
                    op: BinOp::Sub,
                    dest: tv("n"),
                    lhs: tv("n"),
                    rhs: tv("one"),
                },
                Instr::Jmp(Label::new("head")),
                Instr::Label(Label::new("exit")),
                Instr::Ret { arg: tv("s") },
            ],
        );
        let head = Label::new("head");
        assert_eq!(live.live_in(&head), set(&["n", "one", "s"]));
        assert_eq!(live.live_in(&Label::new("exit")), set(&["s"]));
        assert_eq!(live.entry_live(), &set(&["n", "one"]));
        assert!(live.rounds() >= 2);

        // the stable solution satisfies the dataflow equations
        for label in cfg.order() {
            let mut expect = OrdSet::new();
            for succ in cfg.successors(label) {
                expect = expect.union(live.live_in(succ));
            }
            assert_eq!(live.live_out(label), expect);
        }
    }

    #[test]
    fn test_def_in_live_in_only_when_used() {
        let (cfg, live) = analyze(
            vec![t("x")],
            vec![
                Instr::Binary {
                    op: BinOp::Add,
                    dest: tv("x"),
                    lhs: tv("x"),
                    rhs: tv("x"),
                },
                Instr::Const { dest: tv("y"), value: 1 },
                Instr::Print { arg: tv("x") },
                Instr::Print { arg: tv("y") },
            ],
        );
        let block = cfg.block(cfg.entry()).unwrap();
        for (instr, sets) in block.body.iter().zip(&live.block(cfg.entry()).unwrap().instrs) {
            if let Some(d) = instr.def()
                && sets.live_in.contains(d)
            {
                assert!(instr.uses().contains(&d));
            }
        }
    }

    #[test]
    fn test_phi_args_live_on_edges_only() {
        let phi = Instr::Phi {
            dest: Temp::versioned("x", 3),
            args: [
                (PhiEdge::Block(Label::new("a")), Temp::versioned("x", 1)),
                (PhiEdge::Block(Label::new("b")), Temp::versioned("x", 2)),
            ]
            .into_iter()
            .collect(),
        };
        let (_, live) = analyze(
            vec![],
            vec![
                Instr::Label(Label::new("a")),
                Instr::Const { dest: Var::Temp(Temp::versioned("x", 1)), value: 1 },
                Instr::Branch {
                    cond: Cond::Nz,
                    arg: Var::Temp(Temp::versioned("x", 1)),
                    target: Label::new("c"),
                },
                Instr::Label(Label::new("b")),
                Instr::Const { dest: Var::Temp(Temp::versioned("x", 2)), value: 2 },
                Instr::Label(Label::new("c")),
                phi,
                Instr::Print { arg: Var::Temp(Temp::versioned("x", 3)) },
            ],
        );
        let c = Label::new("c");
        assert!(live.live_in(&c).is_empty());
        assert_eq!(
            live.live_out(&Label::new("a")),
            [Temp::versioned("x", 1)].into_iter().collect()
        );
        assert_eq!(
            live.live_out(&Label::new("b")),
            [Temp::versioned("x", 2)].into_iter().collect()
        );
        assert_eq!(
            live.instr(&c, 0).unwrap().live_out,
            [Temp::versioned("x", 3)].into_iter().collect()
        );
    }

    #[test]
    fn test_sink_and_globals_never_live() {
        let (cfg, live) = analyze(
            vec![],
            vec![
                Instr::Copy {
                    dest: Var::sink(),
                    src: Var::Global(crate::tac::types::Global::new("g")),
                },
                Instr::Print { arg: Var::sink() },
            ],
        );
        for sets in &live.block(cfg.entry()).unwrap().instrs {
            assert!(sets.live_in.is_empty());
            assert!(sets.live_out.is_empty());
        }
    }
}
