//! Three-Address Code
//!
//! The IR consumed by the backend: names, instructions and programs, plus the
//! textual front end (lexer, parser, diagnostics) and a reference interpreter.

pub mod instr;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod report;
pub mod types;

#[cfg(test)]
mod tests;

pub use instr::{BinOp, Cond, Instr, Opcode, Operand, PhiEdge, UnOp};
pub use interp::{InterpError, Interpreter};
pub use parser::parse_program;
pub use program::{GlobalVar, Proc, TacProgram};
pub use report::{Diagnostic, render_diagnostic, report_diagnostics};
pub use types::{Global, Label, Temp, Var};

pub type Span = chumsky::span::SimpleSpan;
pub type Spanned<T> = (T, Span);
