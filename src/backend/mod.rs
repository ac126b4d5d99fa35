//! tacc Compiler Backend
//!
//! This module implements the backend that translates TAC procedures into
//! x86-64 assembly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │   TAC    │──▶│   CFG    │──▶│   SSA    │──▶│ Interference │──▶│ Coloring │
//! │  (Proc)  │   │ Liveness │   │ optimise │   │    Graph     │   │          │
//! └──────────┘   └──────────┘   └──────────┘   └──────────────┘   └────┬─────┘
//!                                                                      │
//!                                ┌──────────┐   ┌──────────┐           │
//!                                │   .s     │◀──│  x86-64  │◀──────────┘
//!                                │  emit    │   │  lower   │
//!                                └──────────┘   └──────────┘
//! ```
//!
//! # Modules
//!
//! - `cfg`: basic blocks and control edges, addressed by label
//! - `liveness`: backward dataflow over the CFG
//! - `ssa`: crude SSA construction and minimization
//! - `optimise`: copy propagation and dead-code elimination
//! - `regalloc`: interference graph and graph-coloring allocator
//! - `x86_64`: instruction selection, frame layout and verification
//! - `emit`: assembly text

pub mod cfg;
pub mod emit;
pub mod error;
pub mod liveness;
pub mod names;
pub mod optimise;
pub mod regalloc;
pub mod ssa;
pub mod x86_64;

#[cfg(test)]
mod tests;

pub use cfg::{BasicBlock, ControlFlowGraph};
pub use emit::emit_program;
pub use error::{BackendError, BackendResult};
pub use liveness::LivenessAnalysis;
pub use names::NameGen;
pub use regalloc::{ColorAssignment, GraphColoringAllocator, InterferenceGraph};
