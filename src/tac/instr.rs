//! TAC Instructions
//!
//! Instructions are a closed sum type over the opcode set. `Instr::build` is the
//! checked constructor used for external input: it validates the operand kinds of
//! each opcode and the range of integer literals.

use super::types::{Global, Label, Temp, Var};
use crate::backend::error::{BackendError, BackendResult};
use std::collections::BTreeMap;
use std::fmt;

/// Opcode names, used for diagnostics and the checked constructor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Jmp,
    Jz,
    Jnz,
    Jl,
    Jle,
    Jnl,
    Jnle,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Not,
    Const,
    Copy,
    Label,
    Param,
    Call,
    Ret,
    Print,
    Phi,
}

impl Opcode {
    const ALL: &'static [Opcode] = &[
        Opcode::Nop,
        Opcode::Jmp,
        Opcode::Jz,
        Opcode::Jnz,
        Opcode::Jl,
        Opcode::Jle,
        Opcode::Jnl,
        Opcode::Jnle,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Neg,
        Opcode::Not,
        Opcode::Const,
        Opcode::Copy,
        Opcode::Label,
        Opcode::Param,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Print,
        Opcode::Phi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::Jnz => "jnz",
            Opcode::Jl => "jl",
            Opcode::Jle => "jle",
            Opcode::Jnl => "jnl",
            Opcode::Jnle => "jnle",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Neg => "neg",
            Opcode::Not => "not",
            Opcode::Const => "const",
            Opcode::Copy => "copy",
            Opcode::Label => "label",
            Opcode::Param => "param",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Print => "print",
            Opcode::Phi => "phi",
        }
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Binary arithmetic and bitwise operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn opcode(self) -> Opcode {
        match self {
            BinOp::Add => Opcode::Add,
            BinOp::Sub => Opcode::Sub,
            BinOp::Mul => Opcode::Mul,
            BinOp::Div => Opcode::Div,
            BinOp::Mod => Opcode::Mod,
            BinOp::And => Opcode::And,
            BinOp::Or => Opcode::Or,
            BinOp::Xor => Opcode::Xor,
            BinOp::Shl => Opcode::Shl,
            BinOp::Shr => Opcode::Shr,
        }
    }

    /// Evaluate with 64-bit two's-complement semantics.
    ///
    /// Returns `None` on division by zero. Shift counts are taken modulo 64.
    pub fn eval(self, a: i64, b: i64) -> Option<i64> {
        let v = match self {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            BinOp::Mod => {
                if b == 0 {
                    return None;
                }
                a.wrapping_rem(b)
            }
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            BinOp::Shl => a.wrapping_shl((b & 63) as u32),
            BinOp::Shr => a.wrapping_shr((b & 63) as u32),
        };
        Some(v)
    }

    /// Division can trap, so it is never dead code.
    pub fn can_trap(self) -> bool {
        matches!(self, BinOp::Div | BinOp::Mod)
    }
}

/// Unary operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn opcode(self) -> Opcode {
        match self {
            UnOp::Neg => Opcode::Neg,
            UnOp::Not => Opcode::Not,
        }
    }

    pub fn eval(self, a: i64) -> i64 {
        match self {
            UnOp::Neg => a.wrapping_neg(),
            UnOp::Not => !a,
        }
    }
}

/// Conditional jump kinds, all comparing one value against zero
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cond {
    /// jz: value == 0
    Z,
    /// jnz: value != 0
    Nz,
    /// jl: value < 0
    L,
    /// jle: value <= 0
    Le,
    /// jnl: value >= 0
    Nl,
    /// jnle: value > 0
    Nle,
}

impl Cond {
    pub fn opcode(self) -> Opcode {
        match self {
            Cond::Z => Opcode::Jz,
            Cond::Nz => Opcode::Jnz,
            Cond::L => Opcode::Jl,
            Cond::Le => Opcode::Jle,
            Cond::Nl => Opcode::Jnl,
            Cond::Nle => Opcode::Jnle,
        }
    }

    pub fn holds(self, v: i64) -> bool {
        match self {
            Cond::Z => v == 0,
            Cond::Nz => v != 0,
            Cond::L => v < 0,
            Cond::Le => v <= 0,
            Cond::Nl => v >= 0,
            Cond::Nle => v > 0,
        }
    }
}

/// Incoming edge of a phi argument
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PhiEdge {
    /// Synthetic edge carrying parameter values into the entry block
    Entry,
    Block(Label),
}

impl fmt::Display for PhiEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhiEdge::Entry => write!(f, "entry"),
            PhiEdge::Block(l) => write!(f, "{}", l),
        }
    }
}

/// An untyped operand as it appears in source text
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Temp(Temp),
    Global(Global),
    Label(Label),
    /// Integer literal text, range-checked when the instruction is built
    Int(String),
}

impl Operand {
    fn kind(&self) -> &'static str {
        match self {
            Operand::Temp(_) => "a temporary",
            Operand::Global(_) => "a global",
            Operand::Label(_) => "a label",
            Operand::Int(_) => "an integer",
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(t) => write!(f, "{}", t),
            Operand::Global(g) => write!(f, "{}", g),
            Operand::Label(l) => write!(f, "{}", l),
            Operand::Int(s) => write!(f, "{}", s),
        }
    }
}

/// A TAC instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    Nop,
    Label(Label),
    Jmp(Label),
    Branch {
        cond: Cond,
        arg: Var,
        target: Label,
    },
    Binary {
        op: BinOp,
        dest: Var,
        lhs: Var,
        rhs: Var,
    },
    Unary {
        op: UnOp,
        dest: Var,
        arg: Var,
    },
    Const {
        dest: Var,
        value: i64,
    },
    Copy {
        dest: Var,
        src: Var,
    },
    /// Stage argument `index` (from 1) for the next call
    Param {
        index: u32,
        arg: Var,
    },
    Call {
        dest: Var,
        func: Global,
        argc: u32,
    },
    Ret {
        arg: Var,
    },
    Print {
        arg: Var,
    },
    Phi {
        dest: Temp,
        args: BTreeMap<PhiEdge, Temp>,
    },
}

impl Instr {
    /// Checked constructor for instructions read from external input.
    pub fn build(opcode: &str, dest: Option<Operand>, args: Vec<Operand>) -> BackendResult<Instr> {
        let op = Opcode::from_name(opcode)
            .ok_or_else(|| BackendError::malformed(opcode, "unknown opcode"))?;
        let mut args = args.into_iter();
        let arg1 = args.next();
        let arg2 = args.next();
        if args.next().is_some() {
            return Err(BackendError::malformed(opcode, "too many operands"));
        }

        let instr = match op {
            Opcode::Nop => {
                no_dest(op, &dest)?;
                absent(op, &arg1, "first")?;
                absent(op, &arg2, "second")?;
                Instr::Nop
            }
            Opcode::Jmp | Opcode::Label => {
                no_dest(op, &dest)?;
                let label = expect_label(op, arg1)?;
                absent(op, &arg2, "second")?;
                if op == Opcode::Jmp {
                    Instr::Jmp(label)
                } else {
                    Instr::Label(label)
                }
            }
            Opcode::Jz | Opcode::Jnz | Opcode::Jl | Opcode::Jle | Opcode::Jnl | Opcode::Jnle => {
                no_dest(op, &dest)?;
                let cond = match op {
                    Opcode::Jz => Cond::Z,
                    Opcode::Jnz => Cond::Nz,
                    Opcode::Jl => Cond::L,
                    Opcode::Jle => Cond::Le,
                    Opcode::Jnl => Cond::Nl,
                    _ => Cond::Nle,
                };
                Instr::Branch {
                    cond,
                    arg: expect_var(op, arg1)?,
                    target: expect_label(op, arg2)?,
                }
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr => {
                let binop = match op {
                    Opcode::Add => BinOp::Add,
                    Opcode::Sub => BinOp::Sub,
                    Opcode::Mul => BinOp::Mul,
                    Opcode::Div => BinOp::Div,
                    Opcode::Mod => BinOp::Mod,
                    Opcode::And => BinOp::And,
                    Opcode::Or => BinOp::Or,
                    Opcode::Xor => BinOp::Xor,
                    Opcode::Shl => BinOp::Shl,
                    _ => BinOp::Shr,
                };
                Instr::Binary {
                    op: binop,
                    dest: expect_dest(op, dest)?,
                    lhs: expect_var(op, arg1)?,
                    rhs: expect_var(op, arg2)?,
                }
            }
            Opcode::Neg | Opcode::Not => {
                let unop = if op == Opcode::Neg { UnOp::Neg } else { UnOp::Not };
                let dest = expect_dest(op, dest)?;
                let arg = expect_var(op, arg1)?;
                absent(op, &arg2, "second")?;
                Instr::Unary { op: unop, dest, arg }
            }
            Opcode::Const => {
                let dest = expect_dest(op, dest)?;
                let value = expect_int(op, arg1)?;
                absent(op, &arg2, "second")?;
                Instr::Const { dest, value }
            }
            Opcode::Copy => {
                let dest = expect_dest(op, dest)?;
                let src = expect_var(op, arg1)?;
                absent(op, &arg2, "second")?;
                Instr::Copy { dest, src }
            }
            Opcode::Param => {
                no_dest(op, &dest)?;
                let index = expect_int(op, arg1)?;
                let index = u32::try_from(index)
                    .ok()
                    .filter(|i| *i >= 1)
                    .ok_or_else(|| BackendError::malformed(op.name(), "parameter index must be at least 1"))?;
                Instr::Param {
                    index,
                    arg: expect_var(op, arg2)?,
                }
            }
            Opcode::Call => {
                let dest = match dest {
                    Some(d) => expect_dest(op, Some(d))?,
                    None => Var::sink(),
                };
                let func = match arg1 {
                    Some(Operand::Global(g)) => g,
                    other => return Err(mismatch(op, "first", "a global", other.as_ref())),
                };
                let argc = expect_int(op, arg2)?;
                let argc = u32::try_from(argc)
                    .map_err(|_| BackendError::malformed(op.name(), "argument count must not be negative"))?;
                Instr::Call { dest, func, argc }
            }
            Opcode::Ret => {
                no_dest(op, &dest)?;
                let arg = match arg1 {
                    Some(a) => expect_var(op, Some(a))?,
                    None => Var::sink(),
                };
                absent(op, &arg2, "second")?;
                Instr::Ret { arg }
            }
            Opcode::Print => {
                no_dest(op, &dest)?;
                let arg = expect_var(op, arg1)?;
                absent(op, &arg2, "second")?;
                Instr::Print { arg }
            }
            Opcode::Phi => {
                return Err(BackendError::malformed(
                    op.name(),
                    "phi takes a parenthesised list of `edge: temporary` pairs",
                ));
            }
        };
        Ok(instr)
    }

    /// Checked constructor for phi instructions.
    pub fn phi(dest: Operand, args: Vec<(PhiEdge, Operand)>) -> BackendResult<Instr> {
        let dest = match dest {
            Operand::Temp(t) if !t.is_sink() => t,
            other => return Err(mismatch(Opcode::Phi, "destination", "a temporary", Some(&other))),
        };
        let mut map = BTreeMap::new();
        for (edge, arg) in args {
            let arg = match arg {
                Operand::Temp(t) if !t.is_sink() => t,
                other => return Err(mismatch(Opcode::Phi, "incoming", "a temporary", Some(&other))),
            };
            if map.insert(edge.clone(), arg).is_some() {
                return Err(BackendError::malformed(
                    Opcode::Phi.name(),
                    format!("edge {} listed twice", edge),
                ));
            }
        }
        Ok(Instr::Phi { dest, args: map })
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Instr::Nop => Opcode::Nop,
            Instr::Label(_) => Opcode::Label,
            Instr::Jmp(_) => Opcode::Jmp,
            Instr::Branch { cond, .. } => cond.opcode(),
            Instr::Binary { op, .. } => op.opcode(),
            Instr::Unary { op, .. } => op.opcode(),
            Instr::Const { .. } => Opcode::Const,
            Instr::Copy { .. } => Opcode::Copy,
            Instr::Param { .. } => Opcode::Param,
            Instr::Call { .. } => Opcode::Call,
            Instr::Ret { .. } => Opcode::Ret,
            Instr::Print { .. } => Opcode::Print,
            Instr::Phi { .. } => Opcode::Phi,
        }
    }

    /// Destination operand, including globals and the sink
    pub fn dest(&self) -> Option<&Var> {
        match self {
            Instr::Binary { dest, .. }
            | Instr::Unary { dest, .. }
            | Instr::Const { dest, .. }
            | Instr::Copy { dest, .. }
            | Instr::Call { dest, .. } => Some(dest),
            _ => None,
        }
    }

    /// Temporary defined by this instruction (never the sink)
    pub fn def(&self) -> Option<&Temp> {
        match self {
            Instr::Phi { dest, .. } => Some(dest),
            _ => self.dest().and_then(Var::temp).filter(|t| !t.is_sink()),
        }
    }

    /// Value operands read by this instruction, globals included
    pub fn operands(&self) -> Vec<&Var> {
        match self {
            Instr::Branch { arg, .. }
            | Instr::Unary { arg, .. }
            | Instr::Param { arg, .. }
            | Instr::Ret { arg }
            | Instr::Print { arg } => vec![arg],
            Instr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Copy { src, .. } => vec![src],
            _ => vec![],
        }
    }

    /// Temporaries read by this instruction. Phi arguments are read on their
    /// incoming edges and are not included.
    pub fn uses(&self) -> Vec<&Temp> {
        self.operands()
            .into_iter()
            .filter_map(Var::temp)
            .filter(|t| !t.is_sink())
            .collect()
    }

    /// Rewrite every temporary read (not phi arguments) through `f`.
    pub fn rename_uses(&mut self, mut f: impl FnMut(&Temp) -> Option<Temp>) {
        let mut apply = |v: &mut Var| {
            if let Var::Temp(t) = v
                && !t.is_sink()
                && let Some(new) = f(t)
            {
                *t = new;
            }
        };
        match self {
            Instr::Branch { arg, .. }
            | Instr::Unary { arg, .. }
            | Instr::Param { arg, .. }
            | Instr::Ret { arg }
            | Instr::Print { arg } => apply(arg),
            Instr::Binary { lhs, rhs, .. } => {
                apply(lhs);
                apply(rhs);
            }
            Instr::Copy { src, .. } => apply(src),
            _ => {}
        }
    }

    /// Replace the defined temporary, if any.
    pub fn set_def(&mut self, new: Temp) {
        match self {
            Instr::Phi { dest, .. } => *dest = new,
            Instr::Binary { dest, .. }
            | Instr::Unary { dest, .. }
            | Instr::Const { dest, .. }
            | Instr::Copy { dest, .. }
            | Instr::Call { dest, .. } => {
                if matches!(dest, Var::Temp(t) if !t.is_sink()) {
                    *dest = Var::Temp(new);
                }
            }
            _ => {}
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Instr::Phi { .. })
    }

    /// Instructions that end a basic block
    pub fn is_transfer(&self) -> bool {
        matches!(self, Instr::Jmp(_) | Instr::Branch { .. } | Instr::Ret { .. })
    }

    /// Whether control can continue to the next instruction
    pub fn falls_through(&self) -> bool {
        !matches!(self, Instr::Jmp(_) | Instr::Ret { .. })
    }

    /// Explicit jump target
    pub fn target(&self) -> Option<&Label> {
        match self {
            Instr::Jmp(l) | Instr::Branch { target: l, .. } => Some(l),
            _ => None,
        }
    }

    /// No observable effect besides writing a temporary
    pub fn is_pure(&self) -> bool {
        match self {
            Instr::Const { .. } | Instr::Copy { .. } | Instr::Unary { .. } | Instr::Phi { .. } => true,
            Instr::Binary { op, .. } => !op.can_trap(),
            _ => false,
        }
    }
}

fn mismatch(op: Opcode, position: &str, expected: &str, found: Option<&Operand>) -> BackendError {
    let found = match found {
        Some(o) => format!("{} `{}`", o.kind(), o),
        None => "nothing".to_string(),
    };
    BackendError::malformed(
        op.name(),
        format!("{} operand must be {}, found {}", position, expected, found),
    )
}

fn no_dest(op: Opcode, dest: &Option<Operand>) -> BackendResult<()> {
    match dest {
        None => Ok(()),
        Some(d) => Err(BackendError::malformed(
            op.name(),
            format!("takes no destination, found `{}`", d),
        )),
    }
}

fn absent(op: Opcode, arg: &Option<Operand>, position: &str) -> BackendResult<()> {
    match arg {
        None => Ok(()),
        Some(a) => Err(BackendError::malformed(
            op.name(),
            format!("unexpected {} operand `{}`", position, a),
        )),
    }
}

fn expect_dest(op: Opcode, dest: Option<Operand>) -> BackendResult<Var> {
    match dest {
        Some(Operand::Temp(t)) => Ok(Var::Temp(t)),
        Some(Operand::Global(g)) => Ok(Var::Global(g)),
        other => Err(mismatch(op, "destination", "a temporary or global", other.as_ref())),
    }
}

fn expect_var(op: Opcode, arg: Option<Operand>) -> BackendResult<Var> {
    match arg {
        Some(Operand::Temp(t)) => Ok(Var::Temp(t)),
        Some(Operand::Global(g)) => Ok(Var::Global(g)),
        other => Err(mismatch(op, "value", "a temporary or global", other.as_ref())),
    }
}

fn expect_label(op: Opcode, arg: Option<Operand>) -> BackendResult<Label> {
    match arg {
        Some(Operand::Label(l)) => Ok(l),
        other => Err(mismatch(op, "target", "a label", other.as_ref())),
    }
}

fn expect_int(op: Opcode, arg: Option<Operand>) -> BackendResult<i64> {
    match arg {
        Some(Operand::Int(text)) => parse_literal(&text),
        other => Err(mismatch(op, "immediate", "an integer", other.as_ref())),
    }
}

/// Parse a decimal literal into the signed 64-bit range.
pub fn parse_literal(text: &str) -> BackendResult<i64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(BackendError::malformed("const", format!("`{}` is not an integer", text)));
    }
    text.parse::<i64>()
        .map_err(|_| BackendError::LiteralOutOfRange {
            literal: text.to_string(),
        })
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Nop => write!(f, "nop;"),
            Instr::Label(l) => write!(f, "{}:", l),
            Instr::Jmp(l) => write!(f, "jmp {};", l),
            Instr::Branch { cond, arg, target } => write!(f, "{} {}, {};", cond.opcode(), arg, target),
            Instr::Binary { op, dest, lhs, rhs } => {
                write!(f, "{} = {} {}, {};", dest, op.opcode(), lhs, rhs)
            }
            Instr::Unary { op, dest, arg } => write!(f, "{} = {} {};", dest, op.opcode(), arg),
            Instr::Const { dest, value } => write!(f, "{} = const {};", dest, value),
            Instr::Copy { dest, src } => write!(f, "{} = copy {};", dest, src),
            Instr::Param { index, arg } => write!(f, "param {}, {};", index, arg),
            Instr::Call { dest, func, argc } => {
                if dest.is_sink() {
                    write!(f, "call {}, {};", func, argc)
                } else {
                    write!(f, "{} = call {}, {};", dest, func, argc)
                }
            }
            Instr::Ret { arg } => {
                if arg.is_sink() {
                    write!(f, "ret;")
                } else {
                    write!(f, "ret {};", arg)
                }
            }
            Instr::Print { arg } => write!(f, "print {};", arg),
            Instr::Phi { dest, args } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|(edge, t)| format!("{}: {}", edge, t))
                    .collect();
                write!(f, "{} = phi ({});", dest, args.join(", "))
            }
        }
    }
}
