//! Register Allocator
//!
//! Graph-coloring allocator mapping TAC temporaries to x86-64 registers and
//! stack slots.
//!
//! # Algorithm
//!
//! 1. Order the nodes by maximum-cardinality search
//! 2. Color greedily in that order with the smallest free positive color
//! 3. If more colors are needed than registers are available, spill the node of
//!    highest degree to a fresh stack slot, remove it and start over
//! 4. Map color `c` to `X86Reg::PALETTE[c - 1]`
//!
//! Ties are broken by the smallest temporary, so allocation is deterministic.

use super::interference::InterferenceGraph;
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::x86_64::regs::{Location, X86Reg};
use crate::tac::types::Temp;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Result of register allocation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorAssignment {
    /// Mapping from every temporary to its location
    pub locations: BTreeMap<Temp, Location>,
    /// Color of each register-allocated temporary (from 1)
    pub colors: BTreeMap<Temp, usize>,
    /// Spilled temporaries, in spill order; the n-th owns stack slot n
    pub spilled: Vec<Temp>,
}

impl ColorAssignment {
    pub fn location(&self, t: &Temp) -> Option<Location> {
        self.locations.get(t).copied()
    }

    /// Number of stack slots needed for spills
    pub fn spill_slots(&self) -> u32 {
        self.spilled.len() as u32
    }

    /// Number of distinct registers used
    pub fn colors_used(&self) -> usize {
        self.colors.values().max().copied().unwrap_or(0)
    }

    /// Distinct registers holding some temporary
    pub fn registers(&self) -> BTreeSet<X86Reg> {
        self.locations.values().filter_map(|l| l.reg()).collect()
    }

    /// Registers that need to be saved/restored (callee-saved)
    pub fn callee_saved_used(&self) -> Vec<X86Reg> {
        self.registers()
            .into_iter()
            .filter(|r| r.is_callee_saved())
            .collect()
    }
}

impl fmt::Display for ColorAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (t, loc) in &self.locations {
            writeln!(f, "  {} -> {}", t, loc)?;
        }
        Ok(())
    }
}

/// Graph coloring register allocator
pub struct GraphColoringAllocator {
    /// Number of palette registers available
    registers: usize,
}

impl GraphColoringAllocator {
    /// Create a new allocator using the first `registers` palette registers
    pub fn new(registers: usize) -> Self {
        if registers > X86Reg::PALETTE.len() {
            log::warn!(
                "register budget {} exceeds the {} allocatable registers",
                registers,
                X86Reg::PALETTE.len()
            );
        }
        Self {
            registers: registers.min(X86Reg::PALETTE.len()),
        }
    }

    /// Allocate locations for every node of the graph
    pub fn allocate(&self, graph: &InterferenceGraph) -> BackendResult<ColorAssignment> {
        let mut graph = graph.clone();
        let mut spilled: Vec<Temp> = Vec::new();
        let limit = graph.len();

        for _ in 0..=limit {
            let order = max_cardinality_search(&graph);
            let colors = greedy_coloring(&graph, &order);
            let needed = colors.values().max().copied().unwrap_or(0);

            if needed <= self.registers {
                let mut locations = BTreeMap::new();
                for (t, c) in &colors {
                    locations.insert(t.clone(), Location::Reg(X86Reg::PALETTE[c - 1]));
                }
                for (slot, t) in spilled.iter().enumerate() {
                    locations.insert(t.clone(), Location::Stack(slot as u32));
                }
                log::debug!(
                    "allocated {} temporaries: {} color(s), {} spill(s)",
                    locations.len(),
                    needed,
                    spilled.len()
                );
                return Ok(ColorAssignment {
                    locations,
                    colors,
                    spilled,
                });
            }

            let Some(victim) = spill_candidate(&graph) else {
                break;
            };
            log::trace!(
                "{} colors needed with {} registers, spilling {} (degree {})",
                needed,
                self.registers,
                victim,
                graph.degree(&victim)
            );
            graph.remove_node(&victim);
            spilled.push(victim);
        }

        Err(BackendError::unreachable(format!(
            "spilling did not bring the coloring within {} register(s)",
            self.registers
        )))
    }
}

/// Maximum-cardinality search: repeatedly pick the node with the most
/// already-ordered neighbors.
pub fn max_cardinality_search(graph: &InterferenceGraph) -> Vec<Temp> {
    let mut weight: BTreeMap<&Temp, usize> = graph.nodes().map(|t| (t, 0)).collect();
    let mut order = Vec::with_capacity(graph.len());

    while !weight.is_empty() {
        let mut best: Option<(&Temp, usize)> = None;
        for (t, w) in &weight {
            if best.is_none_or(|(_, bw)| *w > bw) {
                best = Some((t, *w));
            }
        }
        let Some((next, _)) = best else {
            break;
        };
        weight.remove(next);
        for n in graph.neighbors(next) {
            if let Some(w) = weight.get_mut(n) {
                *w += 1;
            }
        }
        log::trace!("elimination order: {}", next);
        order.push(next.clone());
    }
    order
}

/// Give each node, in order, the smallest positive color unused by its
/// already-colored neighbors.
pub fn greedy_coloring(graph: &InterferenceGraph, order: &[Temp]) -> BTreeMap<Temp, usize> {
    let mut colors: BTreeMap<Temp, usize> = BTreeMap::new();
    for t in order {
        let taken: BTreeSet<usize> = graph
            .neighbors(t)
            .filter_map(|n| colors.get(n).copied())
            .collect();
        let color = (1..).find(|c| !taken.contains(c)).unwrap_or(1);
        colors.insert(t.clone(), color);
    }
    colors
}

/// The node of maximum degree, smallest temporary on ties
fn spill_candidate(graph: &InterferenceGraph) -> Option<Temp> {
    let mut best: Option<(&Temp, usize)> = None;
    for t in graph.nodes() {
        let d = graph.degree(t);
        if best.is_none_or(|(_, bd)| d > bd) {
            best = Some((t, d));
        }
    }
    best.map(|(t, _)| t.clone())
}
