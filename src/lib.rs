//! tacc: a three-address-code compiler backend
//!
//! Parses TAC text, builds per-procedure control-flow graphs, converts them to
//! SSA form, allocates registers by graph coloring and lowers the result to
//! x86-64 assembly.

pub mod backend;
pub mod cli;
pub mod pipeline;
pub mod tac;
