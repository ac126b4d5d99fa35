//! tacc Compiler Pipeline
//!
//! This module provides the end-to-end compilation pipeline from TAC text to
//! x86-64 assembly.
//!
//! # Pipeline Stages
//!
//! ```text
//! Source Code (&str)
//!     │
//!     ▼ lexer + parser
//! TAC (TacProgram)
//!     │
//!     ▼ per procedure
//! CFG ─▶ SSA ─▶ optimise ─▶ liveness ─▶ interference ─▶ coloring ─▶ lower ─▶ verify
//!     │
//!     ▼ emit
//! Output (String)
//! ```
//!
//! Procedures are compiled independently; a failing procedure does not stop
//! the others, but no listing is produced unless all of them succeed.

use crate::backend::cfg::ControlFlowGraph;
use crate::backend::emit::emit_program;
use crate::backend::error::BackendError;
use crate::backend::liveness::LivenessAnalysis;
use crate::backend::names::NameGen;
use crate::backend::optimise::{OptConfig, optimize_procedure};
use crate::backend::regalloc::{ColorAssignment, GraphColoringAllocator, InterferenceGraph};
use crate::backend::ssa;
use crate::backend::x86_64::{X86Function, X86Program, lower_function, verify_function};
use crate::tac::instr::{Instr, PhiEdge};
use crate::tac::program::{Proc, TacProgram};
use crate::tac::report::Diagnostic;
use crate::tac::parse_program;
use crate::tac::types::{Label, Temp};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Options controlling one compilation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// Convert to SSA form before allocation
    pub ssa: bool,
    /// Run SSA minimization after construction
    pub minimize: bool,
    pub optimise: OptConfig,
    /// Number of palette registers the allocator may use (0 to 10)
    pub registers: usize,
    /// Check the emitted instructions
    pub verify: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            ssa: true,
            minimize: true,
            optimise: OptConfig::all(),
            registers: 10,
            verify: true,
        }
    }
}

/// A backend error located in one procedure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ProcedureError {
    /// Procedure name, with its `@`
    pub proc: String,
    /// Text of the offending instruction, when known
    pub instr: Option<String>,
    #[source]
    pub error: BackendError,
}

impl ProcedureError {
    pub fn new(proc: &Proc, error: BackendError) -> Self {
        Self {
            proc: proc.name.to_string(),
            instr: locate(proc, &error),
            error,
        }
    }
}

impl fmt::Display for ProcedureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] in {}", self.error.code(), self.proc)?;
        if let Some(instr) = &self.instr {
            write!(f, " at `{}`", instr)?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Find the instruction a structural error is about
fn locate(proc: &Proc, error: &BackendError) -> Option<String> {
    let mentions = |instr: &Instr, label: &str| match instr {
        Instr::Phi { args, .. } => args
            .keys()
            .any(|e| matches!(e, PhiEdge::Block(l) if l.as_str() == label)),
        _ => instr.target().is_some_and(|l| l.as_str() == label),
    };

    match error {
        BackendError::UnknownLabel { label } => proc
            .body
            .iter()
            .find(|i| mentions(i, label))
            .map(|i| i.to_string()),
        BackendError::DuplicateLabel { label } => proc
            .body
            .iter()
            .filter(|i| matches!(i, Instr::Label(l) if l.as_str() == label))
            .nth(1)
            .map(|i| i.to_string()),
        _ => None,
    }
}

/// Compilation error types
#[derive(Debug, Error)]
pub enum CompileError {
    /// Syntax or instruction-construction errors in the source text
    #[error("{} error(s) in TAC source", .0.len())]
    Parse(Vec<Diagnostic>),
    /// One or more procedures failed to compile
    #[error("{} procedure(s) failed to compile", .0.len())]
    Procedures(Vec<ProcedureError>),
}

/// Everything produced while compiling one procedure
#[derive(Clone, Debug)]
pub struct CompiledProcedure {
    /// TAC as handed to the allocator (after SSA and optimisation)
    pub tac: Proc,
    pub allocation: ColorAssignment,
    pub function: X86Function,
}

/// Result of a successful compilation
#[derive(Clone, Debug)]
pub struct CompiledProgram {
    pub procs: Vec<CompiledProcedure>,
    pub asm: X86Program,
}

impl CompiledProgram {
    /// The assembly listing
    pub fn listing(&self) -> String {
        emit_program(&self.asm)
    }

    /// The TAC handed to the allocator, as a program
    pub fn tac(&self, globals: &TacProgram) -> TacProgram {
        TacProgram {
            globals: globals.globals.clone(),
            procs: self.procs.iter().map(|p| p.tac.clone()).collect(),
        }
    }
}

/// Every temporary mentioned in a procedure
fn proc_temps(proc: &Proc) -> BTreeSet<&Temp> {
    let mut temps: BTreeSet<&Temp> = proc.params.iter().collect();
    for instr in &proc.body {
        temps.extend(instr.def());
        temps.extend(instr.uses());
        if let Instr::Phi { args, .. } = instr {
            temps.extend(args.values());
        }
    }
    temps
}

/// Compile one procedure down to checked x86-64
pub fn compile_procedure(proc: &Proc, options: &CompileOptions) -> Result<CompiledProcedure, ProcedureError> {
    let fail = |error: BackendError| ProcedureError::new(proc, error);

    let labels: Vec<&Label> = proc
        .body
        .iter()
        .filter_map(|i| match i {
            Instr::Label(l) => Some(l),
            _ => None,
        })
        .collect();
    let mut names = NameGen::new(labels).with_temps(proc_temps(proc));

    // Stage 1: CFG
    let mut cfg = ControlFlowGraph::build(proc, &mut names).map_err(fail)?;

    // Stage 2: SSA
    let in_ssa = if ssa::has_phis(&cfg) {
        ssa::check_single_definition(&cfg).is_ok()
    } else if options.ssa {
        ssa::to_ssa(&mut cfg, &mut names).map_err(fail)?;
        if options.minimize {
            let stats = ssa::minimize(&mut cfg);
            log::debug!(
                "minimized {} in {} round(s): {} null choice(s), {} collapsed",
                cfg.name,
                stats.rounds,
                stats.null_choices,
                stats.collapsed
            );
        }
        ssa::check_single_definition(&cfg).map_err(fail)?;
        ssa::check_phi_completeness(&cfg).map_err(fail)?;
        true
    } else {
        false
    };

    // Stage 3: TAC optimisation
    optimize_procedure(&mut cfg, &options.optimise, in_ssa).map_err(fail)?;

    // Stage 4: allocation
    let liveness = LivenessAnalysis::analyze(&cfg).map_err(fail)?;
    let graph = InterferenceGraph::build(&cfg, &liveness);
    let allocation = GraphColoringAllocator::new(options.registers)
        .allocate(&graph)
        .map_err(fail)?;

    // Stage 5: lowering
    let function = lower_function(&cfg, &liveness, &allocation).map_err(fail)?;
    if options.verify {
        verify_function(&function).map_err(fail)?;
    }

    Ok(CompiledProcedure {
        tac: cfg.to_proc(),
        allocation,
        function,
    })
}

/// Compile every procedure of a program, collecting all failures
pub fn compile_program(
    program: &TacProgram,
    options: &CompileOptions,
) -> Result<CompiledProgram, Vec<ProcedureError>> {
    let mut procs = Vec::new();
    let mut errors = Vec::new();

    for proc in &program.procs {
        match compile_procedure(proc, options) {
            Ok(compiled) => procs.push(compiled),
            Err(e) => {
                log::debug!("{}", e);
                errors.push(e);
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let asm = X86Program {
        data: program
            .globals
            .iter()
            .map(|g| (g.name.name().to_string(), g.value))
            .collect(),
        functions: procs.iter().map(|p| p.function.clone()).collect(),
    };
    Ok(CompiledProgram { procs, asm })
}

/// Parse and compile TAC source text to an assembly listing
pub fn compile(source: &str, options: &CompileOptions) -> Result<String, CompileError> {
    let program = parse_program(source).map_err(CompileError::Parse)?;
    let compiled = compile_program(&program, options).map_err(CompileError::Procedures)?;
    Ok(compiled.listing())
}
