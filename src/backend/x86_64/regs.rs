//! x86-64 registers and temporary locations
//!
//! This module defines the x86-64 register set following the System V AMD64 ABI,
//! and how the allocator and lowerer partition it.

use std::fmt;

/// The sixteen 64-bit general purpose registers
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum X86Reg {
    Rax, // scratch, return value, dividend
    Rcx, // scratch, shift count
    Rdx, // scratch, remainder
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11, // scratch, stack argument loads
    Rbx,
    Rbp, // frame base
    R12,
    R13,
    R14,
    R15,
    Rsp,
}

impl X86Reg {
    /// Registers available for allocation, in color order. Caller-saved first.
    ///
    /// RAX, RCX, RDX and R11 are reserved as scratch registers for lowering.
    pub const PALETTE: &'static [X86Reg] = &[
        X86Reg::Rsi,
        X86Reg::Rdi,
        X86Reg::R8,
        X86Reg::R9,
        X86Reg::R10,
        X86Reg::Rbx,
        X86Reg::R12,
        X86Reg::R13,
        X86Reg::R14,
        X86Reg::R15,
    ];

    /// Lowering scratch registers, never allocated
    pub const SCRATCH: &'static [X86Reg] = &[X86Reg::Rax, X86Reg::Rcx, X86Reg::Rdx, X86Reg::R11];

    /// Clobbered by any call; live palette members are saved around calls
    pub const CALLER_SAVED: &'static [X86Reg] = &[
        X86Reg::Rax,
        X86Reg::Rcx,
        X86Reg::Rdx,
        X86Reg::Rsi,
        X86Reg::Rdi,
        X86Reg::R8,
        X86Reg::R9,
        X86Reg::R10,
        X86Reg::R11,
    ];

    /// Saved in the prologue when the allocation uses them
    pub const CALLEE_SAVED: &'static [X86Reg] = &[
        X86Reg::Rbx,
        X86Reg::Rbp,
        X86Reg::R12,
        X86Reg::R13,
        X86Reg::R14,
        X86Reg::R15,
    ];

    /// Integer argument registers; arguments 7 and up go on the stack
    pub const ARG_REGS: &'static [X86Reg] = &[
        X86Reg::Rdi,
        X86Reg::Rsi,
        X86Reg::Rdx,
        X86Reg::Rcx,
        X86Reg::R8,
        X86Reg::R9,
    ];

    pub const RETURN_REG: X86Reg = X86Reg::Rax;

    pub fn is_caller_saved(self) -> bool {
        Self::CALLER_SAVED.contains(&self)
    }

    pub fn is_callee_saved(self) -> bool {
        Self::CALLEE_SAVED.contains(&self)
    }

    pub fn is_scratch(self) -> bool {
        Self::SCRATCH.contains(&self)
    }

    /// Name of the low byte register, used for shift counts
    pub fn low_byte(self) -> &'static str {
        match self {
            X86Reg::Rax => "al",
            X86Reg::Rbx => "bl",
            X86Reg::Rcx => "cl",
            X86Reg::Rdx => "dl",
            X86Reg::Rsi => "sil",
            X86Reg::Rdi => "dil",
            X86Reg::Rsp => "spl",
            X86Reg::Rbp => "bpl",
            X86Reg::R8 => "r8b",
            X86Reg::R9 => "r9b",
            X86Reg::R10 => "r10b",
            X86Reg::R11 => "r11b",
            X86Reg::R12 => "r12b",
            X86Reg::R13 => "r13b",
            X86Reg::R14 => "r14b",
            X86Reg::R15 => "r15b",
        }
    }
}

impl fmt::Display for X86Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            X86Reg::Rax => "rax",
            X86Reg::Rbx => "rbx",
            X86Reg::Rcx => "rcx",
            X86Reg::Rdx => "rdx",
            X86Reg::Rsi => "rsi",
            X86Reg::Rdi => "rdi",
            X86Reg::Rsp => "rsp",
            X86Reg::Rbp => "rbp",
            X86Reg::R8 => "r8",
            X86Reg::R9 => "r9",
            X86Reg::R10 => "r10",
            X86Reg::R11 => "r11",
            X86Reg::R12 => "r12",
            X86Reg::R13 => "r13",
            X86Reg::R14 => "r14",
            X86Reg::R15 => "r15",
        };
        write!(f, "{}", name)
    }
}

/// Home of a temporary: a palette register or a numbered stack slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    /// Value is in a register
    Reg(X86Reg),
    /// Value is in stack slot `n`, at `[rbp - 8*(n+1)]`
    Stack(u32),
}

impl Location {
    /// Offset of a stack slot from RBP
    pub fn slot_offset(slot: u32) -> i32 {
        -8 * (slot as i32 + 1)
    }

    pub fn reg(self) -> Option<X86Reg> {
        match self {
            Location::Reg(r) => Some(r),
            Location::Stack(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Reg(r) => write!(f, "{}", r),
            Location::Stack(slot) => write!(f, "[rbp{}]", Location::slot_offset(*slot)),
        }
    }
}
