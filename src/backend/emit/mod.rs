//! Assembly Text Emitter
//!
//! This module emits x86-64 programs as GNU assembler input in Intel syntax.
//! Global variables become `.quad` entries in `.data`; every procedure becomes
//! a global symbol in `.text`.

use crate::backend::x86_64::instr::{X86Function, X86Instr, X86Program};
use std::fmt::Write;

/// Render a whole program
pub fn emit_program(program: &X86Program) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_program(&mut out, program);
    out
}

fn write_program(out: &mut String, program: &X86Program) -> std::fmt::Result {
    writeln!(out, "\t.intel_syntax noprefix")?;

    if !program.data.is_empty() {
        writeln!(out)?;
        writeln!(out, "\t.data")?;
        for (name, value) in &program.data {
            writeln!(out, "\t.globl {}", name)?;
            writeln!(out, "{}:", name)?;
            writeln!(out, "\t.quad {}", value)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "\t.text")?;
    for func in &program.functions {
        writeln!(out)?;
        write_function(out, func)?;
    }
    Ok(())
}

/// Labels flush left, instructions indented
fn write_function(out: &mut String, func: &X86Function) -> std::fmt::Result {
    writeln!(out, "\t.globl {}", func.name)?;
    writeln!(out, "{}:", func.name)?;
    for instr in &func.instructions {
        match instr {
            X86Instr::Label { .. } => writeln!(out, "{}", instr)?,
            _ => writeln!(out, "\t{}", instr)?,
        }
    }
    Ok(())
}
