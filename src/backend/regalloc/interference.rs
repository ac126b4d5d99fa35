//! Interference Graph
//!
//! Undirected simple graph over the temporaries of one procedure. An edge means
//! the two temporaries may not share a location.
//!
//! # Rules
//!
//! - `copy`: every live-out temporary interferes with the copy's use and def
//! - any other instruction: every live-out temporary interferes with its def
//! - the destinations of a block's phi group interfere pairwise
//! - parameters interfere pairwise and with everything live on entry
//!
//! Self-pairs and the sink are never added.

use crate::backend::cfg::ControlFlowGraph;
use crate::backend::liveness::LivenessAnalysis;
use crate::tac::instr::Instr;
use crate::tac::types::{Temp, Var};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterferenceGraph {
    /// Adjacency list: temp -> set of interfering temps. Every node has an entry.
    edges: BTreeMap<Temp, BTreeSet<Temp>>,
}

impl InterferenceGraph {
    /// Build the interference graph of a procedure from its liveness
    pub fn build(cfg: &ControlFlowGraph, liveness: &LivenessAnalysis) -> Self {
        let mut graph = InterferenceGraph::default();
        for t in cfg.temps() {
            graph.add_node(t);
        }

        for block in cfg.blocks() {
            let Some(sets) = liveness.block(&block.label) else {
                continue;
            };

            for (instr, live) in block.body.iter().zip(&sets.instrs) {
                let mut targets: Vec<&Temp> = instr.def().into_iter().collect();
                if let Instr::Copy {
                    src: Var::Temp(s), ..
                } = instr
                    && !s.is_sink()
                {
                    targets.push(s);
                }
                for out in &live.live_out {
                    for t in &targets {
                        graph.add_edge(out, t);
                    }
                }
            }

            let phi_dests: Vec<&Temp> = block.phis().filter_map(Instr::def).collect();
            for (i, a) in phi_dests.iter().enumerate() {
                for b in &phi_dests[i + 1..] {
                    graph.add_edge(a, b);
                }
            }
        }

        let params: Vec<&Temp> = cfg.params.iter().filter(|p| !p.is_sink()).collect();
        for (i, a) in params.iter().enumerate() {
            for b in &params[i + 1..] {
                graph.add_edge(a, b);
            }
            for live in liveness.entry_live() {
                graph.add_edge(a, live);
            }
        }

        log::debug!(
            "interference graph for {}: {} node(s), {} edge(s)",
            cfg.name,
            graph.len(),
            graph.edge_count()
        );
        graph
    }

    pub fn add_node(&mut self, t: Temp) {
        if !t.is_sink() {
            self.edges.entry(t).or_default();
        }
    }

    /// Add an edge between two temporaries
    pub fn add_edge(&mut self, a: &Temp, b: &Temp) {
        if a == b || a.is_sink() || b.is_sink() {
            return;
        }
        self.edges.entry(a.clone()).or_default().insert(b.clone());
        self.edges.entry(b.clone()).or_default().insert(a.clone());
    }

    /// Remove a node and all its edges
    pub fn remove_node(&mut self, t: &Temp) {
        if let Some(neighbors) = self.edges.remove(t) {
            for n in neighbors {
                if let Some(set) = self.edges.get_mut(&n) {
                    set.remove(t);
                }
            }
        }
    }

    /// Nodes in ascending order
    pub fn nodes(&self) -> impl Iterator<Item = &Temp> {
        self.edges.keys()
    }

    pub fn contains(&self, t: &Temp) -> bool {
        self.edges.contains_key(t)
    }

    /// Get neighbors of a temporary
    pub fn neighbors(&self, t: &Temp) -> impl Iterator<Item = &Temp> {
        self.edges.get(t).into_iter().flat_map(|s| s.iter())
    }

    /// Get the degree (number of neighbors) of a temporary
    pub fn degree(&self, t: &Temp) -> usize {
        self.edges.get(t).map_or(0, |s| s.len())
    }

    pub fn interferes(&self, a: &Temp, b: &Temp) -> bool {
        self.edges.get(a).is_some_and(|s| s.contains(b))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|s| s.len()).sum::<usize>() / 2
    }

    /// Every edge once, smaller endpoint first
    pub fn edges(&self) -> impl Iterator<Item = (&Temp, &Temp)> {
        self.edges
            .iter()
            .flat_map(|(a, set)| set.iter().filter(move |b| a < *b).map(move |b| (a, b)))
    }
}

impl fmt::Display for InterferenceGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (t, set) in &self.edges {
            let neighbors: Vec<String> = set.iter().map(|n| n.to_string()).collect();
            writeln!(f, "{}: {}", t, neighbors.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::names::NameGen;
    use crate::tac::instr::BinOp;
    use crate::tac::program::Proc;
    use crate::tac::types::Global;

    fn t(name: &str) -> Temp {
        Temp::new(name)
    }

    fn tv(name: &str) -> Var {
        Var::Temp(t(name))
    }

    fn graph_of(params: Vec<Temp>, body: Vec<Instr>) -> InterferenceGraph {
        let proc = Proc::new("p", params, body);
        let cfg = ControlFlowGraph::build(&proc, &mut NameGen::new(&[])).unwrap();
        let liveness = LivenessAnalysis::analyze(&cfg).unwrap();
        InterferenceGraph::build(&cfg, &liveness)
    }

    #[test]
    fn test_operands_of_add_interfere() {
        let graph = graph_of(
            vec![],
            vec![
                Instr::Const { dest: tv("0"), value: 10 },
                Instr::Const { dest: tv("1"), value: 20 },
                Instr::Binary {
                    op: BinOp::Add,
                    dest: tv("2"),
                    lhs: tv("0"),
                    rhs: tv("1"),
                },
                Instr::Print { arg: tv("2") },
            ],
        );
        assert_eq!(graph.len(), 3);
        assert!(graph.interferes(&t("0"), &t("1")));
        assert!(!graph.interferes(&t("0"), &t("2")));
        assert!(!graph.interferes(&t("1"), &t("2")));
    }

    #[test]
    fn test_values_live_across_call_interfere() {
        // %a and %b are both needed after the call
        let graph = graph_of(
            vec![],
            vec![
                Instr::Const { dest: tv("a"), value: 1 },
                Instr::Const { dest: tv("b"), value: 2 },
                Instr::Call {
                    dest: tv("r"),
                    func: Global::new("f"),
                    argc: 0,
                },
                Instr::Print { arg: tv("a") },
                Instr::Print { arg: tv("b") },
                Instr::Print { arg: tv("r") },
            ],
        );
        assert!(graph.interferes(&t("a"), &t("b")));
        assert!(graph.interferes(&t("a"), &t("r")));
        assert!(graph.interferes(&t("b"), &t("r")));
    }

    #[test]
    fn test_copy_interferes_with_live_out() {
        let graph = graph_of(
            vec![t("x")],
            vec![
                Instr::Const { dest: tv("k"), value: 7 },
                Instr::Copy { dest: tv("y"), src: tv("x") },
                Instr::Binary {
                    op: BinOp::Add,
                    dest: tv("z"),
                    lhs: tv("y"),
                    rhs: tv("k"),
                },
                Instr::Print { arg: tv("z") },
            ],
        );
        // %k is live out of the copy, so it meets both %x and %y
        assert!(graph.interferes(&t("k"), &t("x")));
        assert!(graph.interferes(&t("k"), &t("y")));
        assert!(graph.interferes(&t("x"), &t("y")));
        // %z is defined once %x is dead
        assert!(!graph.interferes(&t("x"), &t("z")));
    }

    #[test]
    fn test_params_interfere_and_unused_temps_are_nodes() {
        let graph = graph_of(
            vec![t("a"), t("b")],
            vec![Instr::Const { dest: tv("dead"), value: 1 }, Instr::Ret { arg: tv("a") }],
        );
        assert!(graph.interferes(&t("a"), &t("b")));
        assert!(graph.contains(&t("dead")));
        assert!(!graph.contains(&Temp::sink()));
        assert_eq!(graph.edges().count(), graph.edge_count());
    }

    #[test]
    fn test_remove_node() {
        let mut graph = InterferenceGraph::default();
        graph.add_edge(&t("a"), &t("b"));
        graph.add_edge(&t("a"), &t("c"));
        graph.add_edge(&t("a"), &t("a"));
        graph.add_edge(&t("a"), &Temp::sink());
        assert_eq!(graph.degree(&t("a")), 2);
        graph.remove_node(&t("a"));
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edge_count(), 0);
    }
}
