use crate::pipeline::{CompiledProgram, ProcedureError};
use colored::Colorize;
use std::fmt::Write;

/// Render every procedure's register assignment
pub fn format_allocation(program: &CompiledProgram) -> String {
    let mut out = String::new();
    for proc in &program.procs {
        let alloc = &proc.allocation;
        let _ = writeln!(
            out,
            "{}: {} register(s), {} spill(s), {} byte frame",
            proc.tac.name,
            alloc.registers().len(),
            alloc.spill_slots(),
            proc.function.frame.size()
        );
        out.push_str(&alloc.to_string());
    }
    out
}

/// Print a failure summary in red
pub fn print_failure(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

/// Print every procedure error, followed by a count
pub fn print_procedure_errors(filename: &str, errors: &[ProcedureError]) {
    for e in errors {
        eprintln!("{} {}: {}", "error:".red().bold(), filename, e);
    }
    eprintln!(
        "{}",
        format!("{} procedure(s) failed to compile", errors.len()).red()
    );
}
