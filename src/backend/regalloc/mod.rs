//! Register Allocation
//!
//! This module maps TAC temporaries to x86-64 registers and stack slots.
//!
//! # Pipeline
//!
//! ```text
//! TAC (temporaries) → Liveness → Interference Graph → Coloring → ColorAssignment
//! ```

pub mod allocator;
pub mod interference;

pub use allocator::{ColorAssignment, GraphColoringAllocator, greedy_coloring, max_cardinality_search};
pub use interference::InterferenceGraph;
