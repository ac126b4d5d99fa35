//! Emitted-code verification
//!
//! Checks the register-class and operand-form constraints the lowering
//! templates rely on, using the read/write sets every [`X86Instr`] reports:
//!
//! 1. **Operand forms**: no memory-to-memory pairs, and 64-bit immediates only
//!    in `mov reg, imm`
//! 2. **Division**: `idiv` directly follows `cqo` and divides by neither RAX,
//!    RDX nor an immediate
//! 3. **Shifts**: the count is in RCX
//! 4. **Scratch discipline**: a scratch register is never read before it is
//!    written in the same straight-line run

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::x86_64::instr::{X86Function, X86Instr, X86Operand};
use crate::backend::x86_64::regs::X86Reg;
use std::collections::BTreeSet;

/// Verify a single function
pub fn verify_function(func: &X86Function) -> BackendResult<()> {
    // Argument registers carry values on entry
    let mut defined: BTreeSet<X86Reg> = X86Reg::ARG_REGS
        .iter()
        .copied()
        .filter(|r| r.is_scratch())
        .collect();
    let mut previous: Option<&X86Instr> = None;

    for (index, instr) in func.instructions.iter().enumerate() {
        let fail = |reason: String| {
            BackendError::unreachable(format!("{}: `{}` (#{}) {}", func.name, instr, index, reason))
        };

        check_operands(instr).map_err(&fail)?;

        match instr {
            X86Instr::Idiv { src } => {
                if !matches!(previous, Some(X86Instr::Cqo)) {
                    return Err(fail("is not preceded by cqo".to_string()));
                }
                match src {
                    X86Operand::Imm(_) => return Err(fail("divides by an immediate".to_string())),
                    X86Operand::Reg(X86Reg::Rax | X86Reg::Rdx) => {
                        return Err(fail("divides by an implicit operand".to_string()));
                    }
                    _ => {}
                }
            }
            X86Instr::Shift { count, .. } if *count != X86Reg::Rcx => {
                return Err(fail(format!("shifts by {} instead of cl", count.low_byte())));
            }
            _ => {}
        }

        if let X86Instr::Label { .. } = instr {
            defined.clear();
        }

        for reg in instr.reads() {
            if reg.is_scratch() && !defined.contains(&reg) {
                return Err(fail(format!("reads scratch register {} before writing it", reg)));
            }
        }

        if let X86Instr::Call { .. } = instr {
            defined.clear();
            defined.insert(X86Reg::RETURN_REG);
        } else {
            defined.extend(instr.writes().into_iter().filter(|r| r.is_scratch()));
        }

        previous = Some(instr);
    }
    Ok(())
}

fn check_operands(instr: &X86Instr) -> Result<(), String> {
    let operands = instr.operands();
    if operands.iter().filter(|o| o.is_mem()).count() > 1 {
        return Err("has two memory operands".to_string());
    }

    let wide_ok = matches!(
        instr,
        X86Instr::Mov {
            dst: X86Operand::Reg(_),
            src: X86Operand::Imm(_),
        }
    );
    for operand in operands {
        if let X86Operand::Imm(v) = operand
            && i32::try_from(*v).is_err()
            && !wide_ok
        {
            return Err(format!("uses immediate {} wider than 32 bits", v));
        }
    }
    Ok(())
}
