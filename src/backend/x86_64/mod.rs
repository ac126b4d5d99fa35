//! x86-64 Backend
//!
//! This module provides the x86-64 code generation backend including:
//! - Register definitions and the allocation palette
//! - Instruction types with read/write sets
//! - TAC to x86-64 lowering
//! - Verification of the emitted instructions
//!
//! # Pipeline
//!
//! ```text
//! TAC + ColorAssignment
//!     │
//!     ▼ Lowering
//! x86-64 Instructions
//!     │
//!     ▼ Verification
//! x86-64 Instructions (checked)
//! ```

pub mod instr;
pub mod lower;
pub mod regs;
pub mod verify;

pub use instr::{Condition, FrameLayout, MemOperand, X86Function, X86Instr, X86Operand, X86Program};
pub use lower::{FunctionLowerer, lower_function};
pub use regs::{Location, X86Reg};
pub use verify::verify_function;
