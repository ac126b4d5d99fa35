//! Whole-backend checks over a small corpus of TAC programs

mod common;

use crate::backend::cfg::ControlFlowGraph;
use crate::backend::liveness::{LivenessAnalysis, phi_args_from};
use crate::backend::optimise::OptConfig;
use crate::backend::regalloc::{GraphColoringAllocator, InterferenceGraph};
use crate::backend::ssa;
use crate::backend::x86_64::Location;
use crate::pipeline::{CompileOptions, compile_procedure, compile_program};
use crate::tac::instr::Instr;
use crate::tac::interp::run_program;
use crate::tac::program::Proc;
use crate::tac::types::{Label, Temp};
use common::*;
use im::OrdSet;
use std::collections::BTreeSet;

fn ssa_cfg(proc: &Proc, minimize: bool) -> ControlFlowGraph {
    let (mut cfg, mut names) = cfg_of(proc);
    ssa::to_ssa(&mut cfg, &mut names).unwrap();
    if minimize {
        ssa::minimize(&mut cfg);
    }
    cfg
}

#[test]
fn test_corpus_interprets() {
    for (name, src, expected) in PROGRAMS {
        let program = parse(src);
        assert_eq!(run_program(&program).unwrap(), *expected, "{}", name);
    }
}

#[test]
fn test_cfg_preserves_instruction_order() {
    for (name, proc) in all_procs() {
        let (cfg, _) = cfg_of(&proc);
        assert_eq!(cfg.instrs(), proc.body, "{}", name);
    }
}

#[test]
fn test_cfg_edges_are_symmetric() {
    for (name, proc) in all_procs() {
        let (cfg, _) = cfg_of(&proc);
        for label in cfg.order() {
            for succ in cfg.successors(label) {
                assert!(cfg.predecessors(succ).contains(label), "{}: {} -> {}", name, label, succ);
            }
            for pred in cfg.predecessors(label) {
                assert!(cfg.successors(pred).contains(label), "{}: {} <- {}", name, label, pred);
            }
        }
    }
}

#[test]
fn test_liveness_satisfies_recurrence() {
    for (name, proc) in all_procs() {
        for in_ssa in [false, true] {
            let cfg = if in_ssa { ssa_cfg(&proc, true) } else { cfg_of(&proc).0 };
            let liveness = LivenessAnalysis::analyze(&cfg).unwrap();

            for block in cfg.blocks() {
                let sets = liveness.block(&block.label).unwrap();

                let mut expected_out = OrdSet::new();
                for succ in cfg.successors(&block.label) {
                    expected_out = expected_out.union(liveness.live_in(succ));
                    let succ_block = cfg.block(succ).unwrap();
                    expected_out.extend(phi_args_from(succ_block, &block.label).cloned());
                }
                assert_eq!(sets.live_out, expected_out, "{}: live-out of {}", name, block.label);

                for (i, instr) in block.body.iter().enumerate().skip(block.phi_count()) {
                    let around = &sets.instrs[i];
                    let mut expected_in = around.live_out.clone();
                    if let Some(d) = instr.def() {
                        expected_in.remove(d);
                    }
                    expected_in.extend(instr.uses().into_iter().filter(|t| !t.is_sink()).cloned());
                    assert_eq!(around.live_in, expected_in, "{}: {} in {}", name, instr, block.label);
                    if let Some(d) = instr.def()
                        && around.live_in.contains(d)
                    {
                        assert!(instr.uses().contains(&d), "{}: {} live into its own definition", name, d);
                    }
                }
            }
        }
    }
}

#[test]
fn test_liveness_is_stable() {
    for (name, proc) in all_procs() {
        let cfg = ssa_cfg(&proc, true);
        let first = LivenessAnalysis::analyze(&cfg).unwrap();
        let second = LivenessAnalysis::analyze(&cfg).unwrap();
        for label in cfg.order() {
            assert_eq!(first.block(label), second.block(label), "{}: {}", name, label);
        }
        assert_eq!(first.entry_live(), second.entry_live(), "{}", name);
    }
}

#[test]
fn test_ssa_is_well_formed() {
    for (name, proc) in all_procs() {
        for minimize in [false, true] {
            let cfg = ssa_cfg(&proc, minimize);
            ssa::check_single_definition(&cfg).unwrap_or_else(|e| panic!("{}: {}", name, e));
            ssa::check_phi_completeness(&cfg).unwrap_or_else(|e| panic!("{}: {}", name, e));
        }
    }
}

#[test]
fn test_minimize_never_adds_phis() {
    for (name, proc) in all_procs() {
        let crude = ssa_cfg(&proc, false);
        let minimal = ssa_cfg(&proc, true);
        let count = |cfg: &ControlFlowGraph| cfg.blocks().map(|b| b.phi_count()).sum::<usize>();
        assert!(count(&minimal) <= count(&crude), "{}", name);
    }
}

#[test]
fn test_coloring_is_valid_for_every_budget() {
    for (name, proc) in all_procs() {
        let cfg = ssa_cfg(&proc, true);
        let liveness = LivenessAnalysis::analyze(&cfg).unwrap();
        let graph = InterferenceGraph::build(&cfg, &liveness);

        for budget in 0..=10 {
            let allocation = GraphColoringAllocator::new(budget).allocate(&graph).unwrap();
            assert!(allocation.registers().len() <= budget, "{} with {}", name, budget);

            for t in graph.nodes() {
                assert!(allocation.location(t).is_some(), "{}: {} unassigned", name, t);
            }
            for (a, b) in graph.edges() {
                if let (Some(Location::Reg(ra)), Some(Location::Reg(rb))) =
                    (allocation.location(a), allocation.location(b))
                {
                    assert_ne!(ra, rb, "{}: {} and {} share {} with {}", name, a, b, ra, budget);
                }
            }

            let slots: BTreeSet<u32> = graph
                .nodes()
                .filter_map(|t| match allocation.location(t) {
                    Some(Location::Stack(n)) => Some(n),
                    _ => None,
                })
                .collect();
            assert_eq!(slots.len() as u32, allocation.spill_slots(), "{} with {}", name, budget);
        }
    }
}

#[test]
fn test_compilation_is_deterministic() {
    for (name, src, _) in PROGRAMS {
        let program = parse(src);
        let options = CompileOptions::default();
        let first = compile_program(&program, &options).unwrap();
        let second = compile_program(&program, &options).unwrap();
        assert_eq!(first.listing(), second.listing(), "{}", name);
        assert_eq!(first.tac(&program), second.tac(&program), "{}", name);
    }
}

#[test]
fn test_compiled_tac_matches_interpreter() {
    let variants = [
        CompileOptions::default(),
        CompileOptions {
            minimize: false,
            ..CompileOptions::default()
        },
        CompileOptions {
            optimise: OptConfig::none(),
            ..CompileOptions::default()
        },
        CompileOptions {
            ssa: false,
            ..CompileOptions::default()
        },
        CompileOptions {
            registers: 2,
            ..CompileOptions::default()
        },
    ];

    for (name, src, expected) in PROGRAMS {
        let program = parse(src);
        for (k, options) in variants.iter().enumerate() {
            let compiled = compile_program(&program, options).unwrap();
            let lowered = compiled.tac(&program);
            assert_eq!(run_program(&lowered).unwrap(), *expected, "{} variant {}", name, k);
        }
    }
}

#[test]
fn test_every_budget_verifies() {
    for (name, src, _) in PROGRAMS {
        let program = parse(src);
        for registers in 0..=10 {
            let options = CompileOptions {
                registers,
                ..CompileOptions::default()
            };
            if let Err(errors) = compile_program(&program, &options) {
                panic!("{} with {} register(s): {}", name, registers, errors[0]);
            }
        }
    }
}

#[test]
fn test_loop_has_single_back_edge() {
    let program = parse(
        "proc @main():
  %i = const 0;
  %n = const 5;
.Lhead:
  %c = sub %i, %n;
  jnl %c, .Lexit;
.Lbody:
  %one = const 1;
  %i = add %i, %one;
  jmp .Lhead;
.Lexit:
  print %i;
  ret;
",
    );
    let (cfg, _) = cfg_of(&program.procs[0]);
    let head = Label::new("head");
    let body = Label::new("body");

    assert_eq!(cfg.back_edges(), vec![(body.clone(), head.clone())]);

    let exits: Vec<(Label, Label)> = cfg
        .edges()
        .into_iter()
        .filter(|(from, to)| (*from == head || *from == body) && *to != head && *to != body)
        .collect();
    assert_eq!(exits, vec![(head.clone(), Label::new("exit"))]);

    // `%i` is carried around the loop and still needed after it
    let liveness = LivenessAnalysis::analyze(&cfg).unwrap();
    assert!(liveness.live_in(&head).contains(&Temp::new("i")));
    assert!(liveness.live_out(&body).contains(&Temp::new("i")));
}

#[test]
fn test_values_live_across_call_get_distinct_homes() {
    let program = parse(
        "proc @main():
  %a = const 1;
  %b = const 2;
  %r = call @zero, 0;
  print %a;
  print %b;
  print %r;
  ret;
proc @zero():
  %z = const 0;
  ret %z;
",
    );
    let options = CompileOptions {
        ssa: false,
        optimise: OptConfig::none(),
        ..CompileOptions::default()
    };
    let compiled = compile_procedure(&program.procs[0], &options).unwrap();
    let a = compiled.allocation.location(&Temp::new("a")).unwrap();
    let b = compiled.allocation.location(&Temp::new("b")).unwrap();
    let r = compiled.allocation.location(&Temp::new("r")).unwrap();
    assert_ne!(a, b);
    assert_ne!(a, r);
    assert_ne!(b, r);

    // Both survivors are saved before the call and reloaded after it
    let text: Vec<String> = compiled
        .function
        .instructions
        .iter()
        .map(|i| i.to_string())
        .collect();
    let call = text.iter().position(|l| l == "call zero").unwrap();
    for home in [a, b] {
        if let Location::Reg(reg) = home {
            let saved = text[..call].iter().any(|l| l.starts_with("mov qword ptr") && l.ends_with(&format!(", {}", reg)));
            assert!(saved, "{} not saved:\n{}", reg, text.join("\n"));
        }
    }
}

#[test]
fn test_phis_are_not_left_for_non_ssa_input() {
    for (name, proc) in all_procs() {
        let options = CompileOptions {
            ssa: false,
            ..CompileOptions::default()
        };
        let compiled = compile_procedure(&proc, &options).unwrap();
        assert!(
            !compiled.tac.body.iter().any(Instr::is_phi),
            "{} gained phis",
            name
        );
    }
}
