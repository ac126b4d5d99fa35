//! Control-Flow Graph
//!
//! Partitions a procedure body into basic blocks. Blocks live in an arena keyed
//! by their label; successor and predecessor lists refer to blocks by label
//! only, so passes can rewrite block bodies without invalidating the graph.
//!
//! # Block boundaries
//!
//! - a `label` starts a new block
//! - `jmp`, conditional jumps and `ret` end the current block
//!
//! # Edges
//!
//! - `jmp L`: one edge to `L`
//! - conditional jump to `L`: an edge to `L` and a fallthrough edge
//! - `ret`: no edges
//! - any other final instruction: a fallthrough edge to the next block

use super::error::{BackendError, BackendResult};
use super::names::NameGen;
use crate::tac::instr::{Instr, PhiEdge};
use crate::tac::program::Proc;
use crate::tac::types::{Global, Label, Temp};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A maximal straight-line run of instructions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    pub label: Label,
    /// False when the label was synthesized for a block that started without one
    pub explicit_label: bool,
    /// Instructions after the label
    pub body: Vec<Instr>,
}

impl BasicBlock {
    /// Number of leading phi instructions
    pub fn phi_count(&self) -> usize {
        self.body.iter().take_while(|i| i.is_phi()).count()
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instr> {
        self.body.iter().take_while(|i| i.is_phi())
    }

    /// The final instruction, if it transfers control
    pub fn terminator(&self) -> Option<&Instr> {
        self.body.last().filter(|i| i.is_transfer())
    }
}

/// Per-procedure CFG
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub name: Global,
    pub params: Vec<Temp>,
    order: Vec<Label>,
    blocks: BTreeMap<Label, BasicBlock>,
    succs: BTreeMap<Label, Vec<Label>>,
    preds: BTreeMap<Label, Vec<Label>>,
}

impl ControlFlowGraph {
    /// Build the CFG of `proc`. The procedure itself is not modified.
    pub fn build(proc: &Proc, names: &mut NameGen) -> BackendResult<Self> {
        let mut seen = HashSet::new();
        for instr in &proc.body {
            if let Instr::Label(l) = instr
                && !seen.insert(l)
            {
                return Err(BackendError::DuplicateLabel {
                    label: l.to_string(),
                });
            }
        }

        let mut blocks: Vec<BasicBlock> = Vec::new();
        let mut current: Option<BasicBlock> = None;
        for instr in &proc.body {
            if let Instr::Label(l) = instr {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some(BasicBlock {
                    label: l.clone(),
                    explicit_label: true,
                    body: Vec::new(),
                });
                continue;
            }

            let block = current.get_or_insert_with(|| BasicBlock {
                label: names.fresh_label(),
                explicit_label: false,
                body: Vec::new(),
            });
            block.body.push(instr.clone());
            if instr.is_transfer()
                && let Some(block) = current.take()
            {
                blocks.push(block);
            }
        }
        if let Some(block) = current.take() {
            blocks.push(block);
        }
        if blocks.is_empty() {
            blocks.push(BasicBlock {
                label: names.fresh_label(),
                explicit_label: false,
                body: Vec::new(),
            });
        }

        let order: Vec<Label> = blocks.iter().map(|b| b.label.clone()).collect();
        let mut succs: BTreeMap<Label, Vec<Label>> = BTreeMap::new();
        let mut preds: BTreeMap<Label, Vec<Label>> = BTreeMap::new();
        for label in &order {
            succs.insert(label.clone(), Vec::new());
            preds.insert(label.clone(), Vec::new());
        }

        for (i, block) in blocks.iter().enumerate() {
            let next = order.get(i + 1);
            let mut out: Vec<Label> = Vec::new();
            let last = block.body.last();
            if let Some(target) = last.and_then(Instr::target) {
                if !preds.contains_key(target) {
                    return Err(BackendError::UnknownLabel {
                        label: target.to_string(),
                    });
                }
                out.push(target.clone());
            }
            let falls_through = last.is_none_or(Instr::falls_through);
            if falls_through
                && let Some(next) = next
                && !out.contains(next)
            {
                out.push(next.clone());
            }

            for succ in &out {
                if let Some(p) = preds.get_mut(succ) {
                    p.push(block.label.clone());
                }
            }
            succs.insert(block.label.clone(), out);
        }

        for block in &blocks {
            for phi in block.phis() {
                if let Instr::Phi { args, .. } = phi {
                    for edge in args.keys() {
                        if let PhiEdge::Block(l) = edge
                            && !preds.contains_key(l)
                        {
                            return Err(BackendError::UnknownLabel {
                                label: l.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let cfg = ControlFlowGraph {
            name: proc.name.clone(),
            params: proc.params.clone(),
            order,
            blocks: blocks.into_iter().map(|b| (b.label.clone(), b)).collect(),
            succs,
            preds,
        };

        log::debug!(
            "built CFG for {}: {} blocks, {} edges",
            cfg.name,
            cfg.order.len(),
            cfg.edges().len()
        );
        let reachable = cfg.reachable();
        for label in &cfg.order {
            if !reachable.contains(label) {
                log::warn!("{}: block {} is unreachable", cfg.name, label);
            }
        }

        Ok(cfg)
    }

    /// Label of the entry block
    pub fn entry(&self) -> &Label {
        &self.order[0]
    }

    /// Block labels in lexical order
    pub fn order(&self) -> &[Label] {
        &self.order
    }

    pub fn block(&self, label: &Label) -> Option<&BasicBlock> {
        self.blocks.get(label)
    }

    pub fn block_mut(&mut self, label: &Label) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(label)
    }

    /// Blocks in lexical order
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.order.iter().filter_map(|l| self.blocks.get(l))
    }

    /// Apply `f` to every block in lexical order
    pub fn for_each_block_mut(&mut self, mut f: impl FnMut(&mut BasicBlock)) {
        for label in &self.order {
            if let Some(block) = self.blocks.get_mut(label) {
                f(block);
            }
        }
    }

    pub fn successors(&self, label: &Label) -> &[Label] {
        self.succs.get(label).map_or(&[], |s| s.as_slice())
    }

    pub fn predecessors(&self, label: &Label) -> &[Label] {
        self.preds.get(label).map_or(&[], |p| p.as_slice())
    }

    /// All edges, in block order
    pub fn edges(&self) -> Vec<(Label, Label)> {
        self.order
            .iter()
            .flat_map(|from| {
                self.successors(from)
                    .iter()
                    .map(move |to| (from.clone(), to.clone()))
            })
            .collect()
    }

    /// Blocks reachable from the entry
    pub fn reachable(&self) -> BTreeSet<Label> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.entry().clone()];
        while let Some(label) = stack.pop() {
            if seen.insert(label.clone()) {
                stack.extend(self.successors(&label).iter().cloned());
            }
        }
        seen
    }

    /// Edges that close a cycle in a depth-first walk from the entry
    pub fn back_edges(&self) -> Vec<(Label, Label)> {
        let mut back = Vec::new();
        let mut on_stack: BTreeSet<Label> = BTreeSet::new();
        let mut visited: BTreeSet<Label> = BTreeSet::new();
        // (block, index of next successor to visit)
        let mut stack: Vec<(Label, usize)> = vec![(self.entry().clone(), 0)];
        visited.insert(self.entry().clone());
        on_stack.insert(self.entry().clone());

        while let Some((label, next)) = stack.pop() {
            let succs = self.successors(&label);
            if next < succs.len() {
                let succ = succs[next].clone();
                stack.push((label.clone(), next + 1));
                if on_stack.contains(&succ) {
                    back.push((label, succ));
                } else if visited.insert(succ.clone()) {
                    on_stack.insert(succ.clone());
                    stack.push((succ, 0));
                }
            } else {
                on_stack.remove(&label);
            }
        }
        back
    }

    /// Instructions in their original order; synthesized labels are omitted
    pub fn instrs(&self) -> Vec<Instr> {
        let mut out = Vec::new();
        for block in self.blocks() {
            if block.explicit_label {
                out.push(Instr::Label(block.label.clone()));
            }
            out.extend(block.body.iter().cloned());
        }
        out
    }

    /// Flatten back into a closed instruction list, labelling every block
    pub fn linearize(&self) -> Vec<Instr> {
        let mut out = Vec::new();
        for block in self.blocks() {
            out.push(Instr::Label(block.label.clone()));
            out.extend(block.body.iter().cloned());
        }
        out
    }

    pub fn to_proc(&self) -> Proc {
        Proc {
            name: self.name.clone(),
            params: self.params.clone(),
            body: self.linearize(),
        }
    }

    /// Every temporary mentioned in the procedure, the sink excluded
    pub fn temps(&self) -> BTreeSet<Temp> {
        let mut temps: BTreeSet<Temp> = self.params.iter().filter(|t| !t.is_sink()).cloned().collect();
        for block in self.blocks() {
            for instr in &block.body {
                temps.extend(instr.def().cloned());
                temps.extend(instr.uses().into_iter().cloned());
                if let Instr::Phi { args, .. } = instr {
                    temps.extend(args.values().cloned());
                }
            }
        }
        temps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac::instr::{BinOp, Cond};
    use crate::tac::types::Var;

    fn tv(name: &str) -> Var {
        Var::Temp(Temp::new(name))
    }

    fn build(body: Vec<Instr>) -> BackendResult<ControlFlowGraph> {
        let proc = Proc::new("p", vec![], body);
        let labels: Vec<Label> = proc
            .body
            .iter()
            .filter_map(|i| match i {
                Instr::Label(l) => Some(l.clone()),
                _ => None,
            })
            .collect();
        let mut names = NameGen::new(&labels);
        ControlFlowGraph::build(&proc, &mut names)
    }

    /// while loop with break and continue:
    ///
    /// ```text
    ///   %i = const 3
    /// .Lhead:
    ///   jz %i, .Lexit
    ///   %i = sub %i, %one
    ///   jz %c, .Lhead       ; continue
    ///   jnz %b, .Lexit      ; break
    ///   jmp .Lhead
    /// .Lexit:
    ///   ret
    /// ```
    fn loop_body() -> Vec<Instr> {
        vec![
            Instr::Const { dest: tv("i"), value: 3 },
            Instr::Label(Label::new("head")),
            Instr::Branch {
                cond: Cond::Z,
                arg: tv("i"),
                target: Label::new("exit"),
            },
            Instr::Binary {
                op: BinOp::Sub,
                dest: tv("i"),
                lhs: tv("i"),
                rhs: tv("one"),
            },
            Instr::Branch {
                cond: Cond::Z,
                arg: tv("c"),
                target: Label::new("head"),
            },
            Instr::Branch {
                cond: Cond::Nz,
                arg: tv("b"),
                target: Label::new("exit"),
            },
            Instr::Jmp(Label::new("head")),
            Instr::Label(Label::new("exit")),
            Instr::Ret { arg: Var::sink() },
        ]
    }

    #[test]
    fn test_block_partition_preserves_order() {
        let body = loop_body();
        let cfg = build(body.clone()).unwrap();
        assert_eq!(cfg.instrs(), body);
        // entry, head, decrement + continue, break, back jump, exit
        assert_eq!(cfg.order().len(), 6);
        assert!(!cfg.block(cfg.entry()).unwrap().explicit_label);

        // every transfer closes its block
        let bodies: Vec<&[Instr]> = cfg.blocks().map(|b| b.body.as_slice()).collect();
        assert_eq!(bodies[0], &body[0..1]);
        assert_eq!(bodies[1], &body[2..3]);
        assert_eq!(bodies[2], &body[3..5]);
        assert_eq!(bodies[3], &body[5..6]);
        assert_eq!(bodies[4], &body[6..7]);
        assert_eq!(bodies[5], &body[8..9]);
        assert_eq!(cfg.order()[1], Label::new("head"));
        assert_eq!(cfg.order()[5], Label::new("exit"));
    }

    #[test]
    fn test_edges_are_symmetric() {
        let cfg = build(loop_body()).unwrap();
        for (from, to) in cfg.edges() {
            assert!(cfg.predecessors(&to).contains(&from));
        }
        for label in cfg.order() {
            for pred in cfg.predecessors(label) {
                assert!(cfg.successors(pred).contains(label));
            }
        }
    }

    #[test]
    fn test_loop_back_edge_and_exit() {
        let cfg = build(loop_body()).unwrap();
        let head = Label::new("head");
        let exit = Label::new("exit");

        let into_head: Vec<_> = cfg.back_edges().into_iter().filter(|(_, to)| *to == head).collect();
        // the continue branch and the closing jmp both return to the header
        assert_eq!(into_head.len(), 2);
        assert!(cfg.successors(&head).contains(&exit));
        assert_eq!(cfg.predecessors(&exit).len(), 2);
    }

    #[test]
    fn test_single_back_edge_loop() {
        let body = vec![
            Instr::Label(Label::new("head")),
            Instr::Branch {
                cond: Cond::Z,
                arg: tv("n"),
                target: Label::new("exit"),
            },
            Instr::Binary {
                op: BinOp::Sub,
                dest: tv("n"),
                lhs: tv("n"),
                rhs: tv("one"),
            },
            Instr::Jmp(Label::new("head")),
            Instr::Label(Label::new("exit")),
            Instr::Ret { arg: Var::sink() },
        ];
        let cfg = build(body).unwrap();
        assert_eq!(cfg.back_edges().len(), 1);
        let body_block = &cfg.order()[1];
        assert_eq!(
            cfg.back_edges()[0],
            (body_block.clone(), Label::new("head"))
        );
        let exits: Vec<_> = cfg
            .edges()
            .into_iter()
            .filter(|(_, to)| *to == Label::new("exit"))
            .collect();
        assert_eq!(exits, vec![(Label::new("head"), Label::new("exit"))]);
    }

    #[test]
    fn test_unknown_and_duplicate_labels() {
        let err = build(vec![Instr::Jmp(Label::new("nowhere"))]).unwrap_err();
        assert_eq!(
            err,
            BackendError::UnknownLabel {
                label: ".Lnowhere".to_string()
            }
        );

        let err = build(vec![
            Instr::Label(Label::new("a")),
            Instr::Nop,
            Instr::Label(Label::new("a")),
        ])
        .unwrap_err();
        assert!(matches!(err, BackendError::DuplicateLabel { .. }));
    }

    #[test]
    fn test_dead_code_tolerated() {
        let cfg = build(vec![
            Instr::Ret { arg: Var::sink() },
            Instr::Const { dest: tv("x"), value: 1 },
            Instr::Print { arg: tv("x") },
        ])
        .unwrap();
        assert_eq!(cfg.order().len(), 2);
        assert_eq!(cfg.reachable().len(), 1);
        assert!(cfg.predecessors(&cfg.order()[1]).is_empty());
    }

    #[test]
    fn test_empty_procedure_has_entry() {
        let cfg = build(vec![]).unwrap();
        assert_eq!(cfg.order().len(), 1);
        assert!(cfg.successors(cfg.entry()).is_empty());
    }

    #[test]
    fn test_branch_to_fallthrough_has_one_edge() {
        let cfg = build(vec![
            Instr::Branch {
                cond: Cond::Z,
                arg: tv("x"),
                target: Label::new("next"),
            },
            Instr::Label(Label::new("next")),
            Instr::Ret { arg: Var::sink() },
        ])
        .unwrap();
        assert_eq!(cfg.successors(cfg.entry()), &[Label::new("next")]);
    }
}
