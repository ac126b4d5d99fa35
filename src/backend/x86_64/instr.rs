//! x86-64 Instruction Definitions
//!
//! This module defines the x86-64 instruction subset produced by lowering, in
//! Intel syntax. Every instruction reports the registers it reads and writes so
//! the verifier can check register-class constraints.

use super::regs::X86Reg;
use crate::tac::instr::Cond;
use std::collections::BTreeSet;
use std::fmt;

/// Condition codes for conditional jumps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    /// Equal (ZF=1)
    E,
    /// Not Equal (ZF=0)
    Ne,
    /// Less Than (SF!=OF)
    L,
    /// Less or Equal (ZF=1 or SF!=OF)
    Le,
    /// Greater Than (ZF=0 and SF=OF)
    G,
    /// Greater or Equal (SF=OF)
    Ge,
}

impl Condition {
    /// Negate the condition
    pub fn negate(self) -> Condition {
        match self {
            Condition::E => Condition::Ne,
            Condition::Ne => Condition::E,
            Condition::L => Condition::Ge,
            Condition::Le => Condition::G,
            Condition::G => Condition::Le,
            Condition::Ge => Condition::L,
        }
    }
}

impl From<Cond> for Condition {
    /// Condition after `cmp value, 0`
    fn from(cond: Cond) -> Self {
        match cond {
            Cond::Z => Condition::E,
            Cond::Nz => Condition::Ne,
            Cond::L => Condition::L,
            Cond::Le => Condition::Le,
            Cond::Nl => Condition::Ge,
            Cond::Nle => Condition::G,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Condition::E => "e",
            Condition::Ne => "ne",
            Condition::L => "l",
            Condition::Le => "le",
            Condition::G => "g",
            Condition::Ge => "ge",
        };
        write!(f, "{}", name)
    }
}

/// Base of a memory operand
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Base {
    Reg(X86Reg),
    /// RIP-relative reference to a data symbol
    Rip(String),
}

/// Memory operand, always a qword
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemOperand {
    pub base: Base,
    pub disp: i32,
}

impl MemOperand {
    /// Create a simple base + displacement operand
    pub fn base_disp(base: X86Reg, disp: i32) -> Self {
        Self {
            base: Base::Reg(base),
            disp,
        }
    }

    /// `[rip + symbol]`
    pub fn symbol(name: impl Into<String>) -> Self {
        Self {
            base: Base::Rip(name.into()),
            disp: 0,
        }
    }

    fn base_reg(&self) -> Option<X86Reg> {
        match self.base {
            Base::Reg(r) => Some(r),
            Base::Rip(_) => None,
        }
    }
}

impl fmt::Display for MemOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "qword ptr [")?;
        match &self.base {
            Base::Reg(r) => write!(f, "{}", r)?,
            Base::Rip(name) => write!(f, "rip+{}", name)?,
        }

        if self.disp > 0 {
            write!(f, "+{}", self.disp)?;
        } else if self.disp < 0 {
            write!(f, "{}", self.disp)?;
        }

        write!(f, "]")
    }
}

/// Register, memory or immediate operand
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum X86Operand {
    Reg(X86Reg),
    Mem(MemOperand),
    Imm(i64),
}

impl X86Operand {
    pub fn is_mem(&self) -> bool {
        matches!(self, X86Operand::Mem(_))
    }

    pub fn reg(&self) -> Option<X86Reg> {
        match self {
            X86Operand::Reg(r) => Some(*r),
            _ => None,
        }
    }

    /// Registers read to evaluate the operand as a source
    fn regs_read(&self) -> Vec<X86Reg> {
        match self {
            X86Operand::Reg(r) => vec![*r],
            X86Operand::Mem(m) => m.base_reg().into_iter().collect(),
            X86Operand::Imm(_) => vec![],
        }
    }

    /// Registers read to address the operand as a destination
    fn address_regs(&self) -> Vec<X86Reg> {
        match self {
            X86Operand::Mem(m) => m.base_reg().into_iter().collect(),
            _ => vec![],
        }
    }
}

impl From<X86Reg> for X86Operand {
    fn from(r: X86Reg) -> Self {
        X86Operand::Reg(r)
    }
}

impl From<MemOperand> for X86Operand {
    fn from(m: MemOperand) -> Self {
        X86Operand::Mem(m)
    }
}

impl fmt::Display for X86Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X86Operand::Reg(r) => write!(f, "{}", r),
            X86Operand::Mem(m) => write!(f, "{}", m),
            X86Operand::Imm(i) => write!(f, "{}", i),
        }
    }
}

/// Two-operand ALU instructions: `op dst, src`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Imul,
    And,
    Or,
    Xor,
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::Imul => "imul",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    /// Arithmetic shift left
    Sal,
    /// Arithmetic shift right
    Sar,
}

impl fmt::Display for ShiftOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftOp::Sal => write!(f, "sal"),
            ShiftOp::Sar => write!(f, "sar"),
        }
    }
}

/// x86-64 Instructions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum X86Instr {
    // === Data Movement ===
    /// mov dst, src
    Mov { dst: X86Operand, src: X86Operand },

    // === Arithmetic ===
    /// add/sub/imul/and/or/xor dst, src
    Alu {
        op: AluOp,
        dst: X86Operand,
        src: X86Operand,
    },
    /// neg dst (two's complement negate)
    Neg { dst: X86Operand },
    /// not dst
    Not { dst: X86Operand },
    /// cqo (sign-extend rax into rdx:rax)
    Cqo,
    /// idiv src (rax = rdx:rax / src, rdx = remainder)
    Idiv { src: X86Operand },
    /// sal/sar dst, <low byte of count>
    Shift {
        op: ShiftOp,
        dst: X86Operand,
        count: X86Reg,
    },

    // === Comparison ===
    /// cmp lhs, rhs
    Cmp { lhs: X86Operand, rhs: X86Operand },

    // === Control Flow ===
    /// jmp label (unconditional)
    Jmp { target: String },
    /// jcc label (conditional)
    Jcc { cond: Condition, target: String },
    /// call label
    Call { target: String },
    /// ret
    Ret,

    // === Stack ===
    /// push src
    Push { src: X86Operand },
    /// pop dst
    Pop { dst: X86Operand },

    Label { name: String },
}

impl X86Instr {
    /// Registers whose value this instruction depends on
    pub fn reads(&self) -> BTreeSet<X86Reg> {
        let mut regs: Vec<X86Reg> = Vec::new();
        match self {
            X86Instr::Mov { dst, src } => {
                regs.extend(src.regs_read());
                regs.extend(dst.address_regs());
            }
            X86Instr::Alu {
                op: AluOp::Xor,
                dst: X86Operand::Reg(a),
                src: X86Operand::Reg(b),
            } if a == b => {}
            X86Instr::Alu { dst, src, .. } => {
                regs.extend(dst.regs_read());
                regs.extend(src.regs_read());
            }
            X86Instr::Neg { dst } | X86Instr::Not { dst } => regs.extend(dst.regs_read()),
            X86Instr::Cqo => regs.push(X86Reg::Rax),
            X86Instr::Idiv { src } => {
                regs.extend([X86Reg::Rax, X86Reg::Rdx]);
                regs.extend(src.regs_read());
            }
            X86Instr::Shift { dst, count, .. } => {
                regs.extend(dst.regs_read());
                regs.push(*count);
            }
            X86Instr::Cmp { lhs, rhs } => {
                regs.extend(lhs.regs_read());
                regs.extend(rhs.regs_read());
            }
            X86Instr::Push { src } => {
                regs.extend(src.regs_read());
                regs.push(X86Reg::Rsp);
            }
            X86Instr::Pop { dst } => {
                regs.extend(dst.address_regs());
                regs.push(X86Reg::Rsp);
            }
            X86Instr::Call { .. } => regs.push(X86Reg::Rsp),
            X86Instr::Ret => regs.extend([X86Reg::Rax, X86Reg::Rsp]),
            X86Instr::Jmp { .. }
            | X86Instr::Jcc { .. }
            | X86Instr::Label { .. } => {}
        }
        regs.into_iter().collect()
    }

    /// Registers this instruction overwrites
    pub fn writes(&self) -> BTreeSet<X86Reg> {
        let mut regs: Vec<X86Reg> = Vec::new();
        match self {
            X86Instr::Mov { dst, .. }
            | X86Instr::Alu { dst, .. }
            | X86Instr::Neg { dst }
            | X86Instr::Not { dst }
            | X86Instr::Shift { dst, .. } => regs.extend(dst.reg()),
            X86Instr::Cqo => regs.push(X86Reg::Rdx),
            X86Instr::Idiv { .. } => regs.extend([X86Reg::Rax, X86Reg::Rdx]),
            X86Instr::Push { .. } => regs.push(X86Reg::Rsp),
            X86Instr::Pop { dst } => {
                regs.extend(dst.reg());
                regs.push(X86Reg::Rsp);
            }
            X86Instr::Call { .. } => regs.extend(X86Reg::CALLER_SAVED),
            X86Instr::Cmp { .. }
            | X86Instr::Jmp { .. }
            | X86Instr::Jcc { .. }
            | X86Instr::Ret
            | X86Instr::Label { .. } => {}
        }
        regs.into_iter().collect()
    }

    /// Operand pairs that would form a memory-to-memory instruction
    pub fn operands(&self) -> Vec<&X86Operand> {
        match self {
            X86Instr::Mov { dst, src } | X86Instr::Alu { dst, src, .. } => vec![dst, src],
            X86Instr::Cmp { lhs, rhs } => vec![lhs, rhs],
            X86Instr::Neg { dst }
            | X86Instr::Not { dst }
            | X86Instr::Shift { dst, .. }
            | X86Instr::Pop { dst } => vec![dst],
            X86Instr::Idiv { src } | X86Instr::Push { src } => vec![src],
            _ => vec![],
        }
    }
}

impl fmt::Display for X86Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X86Instr::Mov { dst, src } => write!(f, "mov {}, {}", dst, src),
            X86Instr::Alu { op, dst, src } => write!(f, "{} {}, {}", op, dst, src),
            X86Instr::Neg { dst } => write!(f, "neg {}", dst),
            X86Instr::Not { dst } => write!(f, "not {}", dst),
            X86Instr::Cqo => write!(f, "cqo"),
            X86Instr::Idiv { src } => write!(f, "idiv {}", src),
            X86Instr::Shift { op, dst, count } => write!(f, "{} {}, {}", op, dst, count.low_byte()),
            X86Instr::Cmp { lhs, rhs } => write!(f, "cmp {}, {}", lhs, rhs),
            X86Instr::Jmp { target } => write!(f, "jmp {}", target),
            X86Instr::Jcc { cond, target } => write!(f, "j{} {}", cond, target),
            X86Instr::Call { target } => write!(f, "call {}", target),
            X86Instr::Ret => write!(f, "ret"),
            X86Instr::Push { src } => write!(f, "push {}", src),
            X86Instr::Pop { dst } => write!(f, "pop {}", dst),
            X86Instr::Label { name } => write!(f, "{}:", name),
        }
    }
}

/// Frame layout of one procedure, in 8-byte slots below RBP
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameLayout {
    /// Spill slots, from slot 0
    pub spill_slots: u32,
    /// Save slots for callee-saved registers, in register order
    pub callee_saves: Vec<X86Reg>,
    /// Save slots for caller-saved registers around calls
    pub caller_saves: Vec<X86Reg>,
    /// Staging slots for `param 1..=n`
    pub staging_slots: u32,
}

impl FrameLayout {
    /// Total number of slots in use
    pub fn slots(&self) -> u32 {
        self.spill_slots
            + self.callee_saves.len() as u32
            + self.caller_saves.len() as u32
            + self.staging_slots
    }

    /// Bytes reserved by the prologue, a multiple of 16
    pub fn size(&self) -> i32 {
        let bytes = self.slots() as i32 * 8;
        (bytes + 15) & !15
    }

    fn slot_of(&self, offset: u32) -> MemOperand {
        MemOperand::base_disp(X86Reg::Rbp, -8 * (offset as i32 + 1))
    }

    pub fn spill(&self, slot: u32) -> MemOperand {
        self.slot_of(slot)
    }

    /// Save slot for a callee-saved or caller-saved register
    pub fn save_slot(&self, reg: X86Reg) -> Option<MemOperand> {
        let base = self.spill_slots;
        if let Some(i) = self.callee_saves.iter().position(|r| *r == reg) {
            return Some(self.slot_of(base + i as u32));
        }
        let base = base + self.callee_saves.len() as u32;
        self.caller_saves
            .iter()
            .position(|r| *r == reg)
            .map(|i| self.slot_of(base + i as u32))
    }

    /// Staging slot for `param index` (from 1)
    pub fn staging(&self, index: u32) -> MemOperand {
        let base = self.spill_slots + self.callee_saves.len() as u32 + self.caller_saves.len() as u32;
        self.slot_of(base + index.saturating_sub(1))
    }
}

/// A sequence of x86-64 instructions forming a function
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct X86Function {
    pub name: String,
    pub frame: FrameLayout,
    pub instructions: Vec<X86Instr>,
}

/// A complete x86-64 program
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct X86Program {
    /// Data symbols with their initial values
    pub data: Vec<(String, i64)>,
    pub functions: Vec<X86Function>,
}
