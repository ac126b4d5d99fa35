//! TAC to x86-64 Lowering
//!
//! This module translates an allocated TAC procedure into x86-64 instructions.
//! Every temporary lives where the [`ColorAssignment`] puts it; RAX, RCX, RDX
//! and R11 are scratch registers owned by the templates below.
//!
//! # Pipeline
//!
//! ```text
//! TAC (allocated temporaries) → FunctionLowerer → X86Function
//! ```
//!
//! # Frame
//!
//! ```text
//! [rbp+16+8k]  stack arguments 7, 8, ...
//! [rbp+8]      return address
//! [rbp]        saved rbp
//! [rbp-8]...   spill slots | callee saves | caller saves | param staging
//! ```

use crate::backend::cfg::ControlFlowGraph;
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::liveness::LivenessAnalysis;
use crate::backend::regalloc::ColorAssignment;
use crate::backend::x86_64::instr::{
    AluOp, Condition, FrameLayout, MemOperand, ShiftOp, X86Function, X86Instr, X86Operand,
};
use crate::backend::x86_64::regs::{Location, X86Reg};
use crate::tac::instr::{BinOp, Instr, PhiEdge, UnOp};
use crate::tac::interp::PRINT_INT;
use crate::tac::types::{Label, Temp, Var};
use im::OrdSet;

/// Lower an allocated procedure to x86-64
pub fn lower_function(
    cfg: &ControlFlowGraph,
    liveness: &LivenessAnalysis,
    allocation: &ColorAssignment,
) -> BackendResult<X86Function> {
    FunctionLowerer::new(cfg, liveness, allocation).lower()
}

/// A conditional-branch edge that needs phi moves before reaching its target
struct Trampoline {
    name: String,
    moves: Vec<(X86Operand, X86Operand)>,
    target: String,
}

/// Function lowering context
pub struct FunctionLowerer<'a> {
    cfg: &'a ControlFlowGraph,
    liveness: &'a LivenessAnalysis,
    allocation: &'a ColorAssignment,
    instructions: Vec<X86Instr>,
    trampolines: Vec<Trampoline>,
    frame: FrameLayout,
}

impl<'a> FunctionLowerer<'a> {
    pub fn new(
        cfg: &'a ControlFlowGraph,
        liveness: &'a LivenessAnalysis,
        allocation: &'a ColorAssignment,
    ) -> Self {
        let body = cfg.blocks().flat_map(|b| b.body.iter());
        let mut calls = false;
        let mut staging = 0;
        for instr in body {
            match instr {
                Instr::Call { .. } | Instr::Print { .. } => calls = true,
                Instr::Param { index, .. } => staging = staging.max(*index),
                _ => {}
            }
        }

        let caller_saves = if calls {
            allocation
                .registers()
                .into_iter()
                .filter(|r| r.is_caller_saved())
                .collect()
        } else {
            Vec::new()
        };

        let frame = FrameLayout {
            spill_slots: allocation.spill_slots(),
            callee_saves: allocation.callee_saved_used(),
            caller_saves,
            staging_slots: staging,
        };

        Self {
            cfg,
            liveness,
            allocation,
            instructions: Vec::new(),
            trampolines: Vec::new(),
            frame,
        }
    }

    pub fn lower(mut self) -> BackendResult<X86Function> {
        self.emit_prologue()?;

        let order = self.cfg.order().to_vec();
        for (i, label) in order.iter().enumerate() {
            self.lower_block(label, order.get(i + 1))?;
        }

        for trampoline in std::mem::take(&mut self.trampolines) {
            self.emit(X86Instr::Label {
                name: trampoline.name,
            });
            self.parallel_move(trampoline.moves);
            self.emit(X86Instr::Jmp {
                target: trampoline.target,
            });
        }

        log::debug!(
            "lowered {}: {} instruction(s), {} byte frame",
            self.cfg.name,
            self.instructions.len(),
            self.frame.size()
        );

        Ok(X86Function {
            name: self.cfg.name.name().to_string(),
            frame: self.frame,
            instructions: self.instructions,
        })
    }

    fn emit(&mut self, instr: X86Instr) {
        self.instructions.push(instr);
    }

    /// Assembly name of a TAC label, unique across procedures
    fn block_name(&self, label: &Label) -> String {
        format!(".L{}{}", self.cfg.name.name(), label)
    }

    fn temp_location(&self, t: &Temp) -> BackendResult<X86Operand> {
        match self.allocation.location(t) {
            Some(Location::Reg(r)) => Ok(X86Operand::Reg(r)),
            Some(Location::Stack(slot)) => Ok(X86Operand::Mem(self.frame.spill(slot))),
            None => Err(BackendError::unreachable(format!(
                "{} has no location in {}",
                t, self.cfg.name
            ))),
        }
    }

    /// Operand for reading a value. The sink reads as zero.
    fn source(&self, v: &Var) -> BackendResult<X86Operand> {
        match v {
            Var::Temp(t) if t.is_sink() => Ok(X86Operand::Imm(0)),
            Var::Temp(t) => self.temp_location(t),
            Var::Global(g) => Ok(X86Operand::Mem(MemOperand::symbol(g.name()))),
        }
    }

    /// Operand for writing a value; `None` discards it
    fn destination(&self, v: &Var) -> BackendResult<Option<X86Operand>> {
        match v {
            Var::Temp(t) if t.is_sink() => Ok(None),
            _ => self.source(v).map(Some),
        }
    }

    /// `mov dst, src`, going through RAX when both are in memory or a wide
    /// immediate targets memory
    fn mov(&mut self, dst: X86Operand, src: X86Operand) {
        if dst == src {
            return;
        }
        let through_rax = match &src {
            X86Operand::Mem(_) => dst.is_mem(),
            X86Operand::Imm(v) => dst.is_mem() && i32::try_from(*v).is_err(),
            X86Operand::Reg(_) => false,
        };
        if through_rax {
            self.emit(X86Instr::Mov {
                dst: X86Reg::Rax.into(),
                src,
            });
            self.emit(X86Instr::Mov {
                dst,
                src: X86Reg::Rax.into(),
            });
        } else {
            self.emit(X86Instr::Mov { dst, src });
        }
    }

    /// Emit function prologue
    fn emit_prologue(&mut self) -> BackendResult<()> {
        self.emit(X86Instr::Push {
            src: X86Reg::Rbp.into(),
        });
        self.emit(X86Instr::Mov {
            dst: X86Reg::Rbp.into(),
            src: X86Reg::Rsp.into(),
        });

        let size = self.frame.size();
        if size > 0 {
            self.emit(X86Instr::Alu {
                op: AluOp::Sub,
                dst: X86Reg::Rsp.into(),
                src: X86Operand::Imm(size as i64),
            });
        }

        // Save callee-saved registers
        for reg in self.frame.callee_saves.clone() {
            if let Some(slot) = self.frame.save_slot(reg) {
                self.emit(X86Instr::Mov {
                    dst: slot.into(),
                    src: reg.into(),
                });
            }
        }

        // Move arguments from ABI registers to allocated locations
        let mut moves = Vec::new();
        let mut stack_params = Vec::new();
        for (i, param) in self.cfg.params.iter().enumerate() {
            if param.is_sink() {
                continue;
            }
            let dst = self.temp_location(param)?;
            match X86Reg::ARG_REGS.get(i) {
                Some(&reg) if dst != X86Operand::Reg(reg) => moves.push((dst, X86Operand::Reg(reg))),
                Some(_) => {}
                None => {
                    let disp = 16 + 8 * (i - X86Reg::ARG_REGS.len()) as i32;
                    stack_params.push((dst, MemOperand::base_disp(X86Reg::Rbp, disp)));
                }
            }
        }
        self.parallel_move(moves);
        for (dst, src) in stack_params {
            self.emit(X86Instr::Mov {
                dst: X86Reg::R11.into(),
                src: src.into(),
            });
            self.mov(dst, X86Reg::R11.into());
        }

        // Parameters flow into the entry block's phis along the entry edge
        let entry = self.cfg.entry().clone();
        let moves = self.edge_moves(&PhiEdge::Entry, &entry)?;
        self.parallel_move(moves);
        Ok(())
    }

    /// Restore the frame and return; the value is already in RAX
    fn emit_epilogue(&mut self) {
        for reg in self.frame.callee_saves.clone() {
            if let Some(slot) = self.frame.save_slot(reg) {
                self.emit(X86Instr::Mov {
                    dst: reg.into(),
                    src: slot.into(),
                });
            }
        }
        self.emit(X86Instr::Mov {
            dst: X86Reg::Rsp.into(),
            src: X86Reg::Rbp.into(),
        });
        self.emit(X86Instr::Pop {
            dst: X86Reg::Rbp.into(),
        });
        self.emit(X86Instr::Ret);
    }

    fn return_zero(&mut self) {
        self.emit(X86Instr::Alu {
            op: AluOp::Xor,
            dst: X86Reg::Rax.into(),
            src: X86Reg::Rax.into(),
        });
        self.emit_epilogue();
    }

    /// Moves realizing the phis of `to` along one incoming edge
    fn edge_moves(&self, edge: &PhiEdge, to: &Label) -> BackendResult<Vec<(X86Operand, X86Operand)>> {
        let Some(block) = self.cfg.block(to) else {
            return Err(BackendError::UnknownLabel {
                label: to.to_string(),
            });
        };
        let mut moves = Vec::new();
        for phi in block.phis() {
            if let Instr::Phi { dest, args } = phi
                && let Some(arg) = args.get(edge)
            {
                let dst = self.temp_location(dest)?;
                let src = self.temp_location(arg)?;
                if dst != src {
                    moves.push((dst, src));
                }
            }
        }
        Ok(moves)
    }

    /// Perform all moves as if simultaneously: every source is pushed before
    /// any destination is written.
    fn parallel_move(&mut self, moves: Vec<(X86Operand, X86Operand)>) {
        match moves.len() {
            0 => {}
            1 => {
                for (dst, src) in moves {
                    self.mov(dst, src);
                }
            }
            _ => {
                for (_, src) in &moves {
                    self.emit(X86Instr::Push { src: src.clone() });
                }
                for (dst, _) in moves.into_iter().rev() {
                    self.emit(X86Instr::Pop { dst });
                }
            }
        }
    }

    fn lower_block(&mut self, label: &Label, next: Option<&Label>) -> BackendResult<()> {
        let Some(block) = self.cfg.block(label) else {
            return Err(BackendError::UnknownLabel {
                label: label.to_string(),
            });
        };
        let name = self.block_name(label);
        self.emit(X86Instr::Label { name });

        for (index, instr) in block.body.iter().enumerate() {
            if instr.is_phi() {
                continue;
            }
            let live_out = self
                .liveness
                .instr(label, index)
                .map(|l| l.live_out.clone())
                .unwrap_or_default();
            self.lower_instruction(label, instr, &live_out)?;
        }

        if block.body.last().is_none_or(Instr::falls_through) {
            match next {
                Some(next) => {
                    let moves = self.edge_moves(&PhiEdge::Block(label.clone()), next)?;
                    self.parallel_move(moves);
                }
                None => self.return_zero(),
            }
        }
        Ok(())
    }

    fn lower_instruction(&mut self, label: &Label, instr: &Instr, live_out: &OrdSet<Temp>) -> BackendResult<()> {
        match instr {
            Instr::Nop | Instr::Phi { .. } | Instr::Label(_) => {}

            Instr::Jmp(target) => {
                let moves = self.edge_moves(&PhiEdge::Block(label.clone()), target)?;
                self.parallel_move(moves);
                let target = self.block_name(target);
                self.emit(X86Instr::Jmp { target });
            }

            Instr::Branch { cond, arg, target } => {
                let lhs = match self.source(arg)? {
                    X86Operand::Imm(v) => {
                        self.emit(X86Instr::Mov {
                            dst: X86Reg::Rax.into(),
                            src: X86Operand::Imm(v),
                        });
                        X86Reg::Rax.into()
                    }
                    other => other,
                };
                self.emit(X86Instr::Cmp {
                    lhs,
                    rhs: X86Operand::Imm(0),
                });

                let moves = self.edge_moves(&PhiEdge::Block(label.clone()), target)?;
                let target_name = self.block_name(target);
                let jump_to = if moves.is_empty() {
                    target_name
                } else {
                    let name = format!(".L{}.T{}", self.cfg.name.name(), self.trampolines.len());
                    self.trampolines.push(Trampoline {
                        name: name.clone(),
                        moves,
                        target: target_name,
                    });
                    name
                };
                self.emit(X86Instr::Jcc {
                    cond: Condition::from(*cond),
                    target: jump_to,
                });
            }

            Instr::Binary { op, dest, lhs, rhs } => self.lower_binary(*op, dest, lhs, rhs)?,

            Instr::Unary { op, dest, arg } => {
                let src = self.source(arg)?;
                self.mov(X86Reg::Rax.into(), src);
                let dst = X86Operand::Reg(X86Reg::Rax);
                self.emit(match op {
                    UnOp::Neg => X86Instr::Neg { dst },
                    UnOp::Not => X86Instr::Not { dst },
                });
                if let Some(dst) = self.destination(dest)? {
                    self.mov(dst, X86Reg::Rax.into());
                }
            }

            Instr::Const { dest, value } => {
                if let Some(dst) = self.destination(dest)? {
                    self.mov(dst, X86Operand::Imm(*value));
                }
            }

            Instr::Copy { dest, src } => {
                if let Some(dst) = self.destination(dest)? {
                    let src = self.source(src)?;
                    self.mov(dst, src);
                }
            }

            Instr::Param { index, arg } => {
                let src = self.source(arg)?;
                let slot = self.frame.staging(*index);
                self.mov(slot.into(), src);
            }

            Instr::Call { dest, func, argc } => {
                let saved = self.save_live_registers(live_out, Some(dest))?;
                self.lower_call(func.name(), *argc);
                self.restore_registers(&saved);
                if let Some(dst) = self.destination(dest)? {
                    self.mov(dst, X86Reg::Rax.into());
                }
            }

            Instr::Print { arg } => {
                let saved = self.save_live_registers(live_out, None)?;
                let src = self.source(arg)?;
                self.mov(X86Reg::Rdi.into(), src);
                self.emit(X86Instr::Call {
                    target: PRINT_INT.to_string(),
                });
                self.restore_registers(&saved);
            }

            Instr::Ret { arg } => {
                match self.source(arg)? {
                    X86Operand::Imm(0) => self.emit(X86Instr::Alu {
                        op: AluOp::Xor,
                        dst: X86Reg::Rax.into(),
                        src: X86Reg::Rax.into(),
                    }),
                    src => self.mov(X86Reg::Rax.into(), src),
                }
                self.emit_epilogue();
            }
        }
        Ok(())
    }

    /// `idiv` traps on `i64::MIN / -1` where TAC wraps. A divisor of -1 is
    /// replaced by 1 through a mask and the quotient negated afterwards, so
    /// the sequence stays branch-free.
    fn lower_division(&mut self, op: BinOp, lhs: X86Operand, rhs: X86Operand) -> X86Reg {
        let rax = || X86Operand::Reg(X86Reg::Rax);
        let rcx = || X86Operand::Reg(X86Reg::Rcx);
        let rdx = || X86Operand::Reg(X86Reg::Rdx);
        let r11 = || X86Operand::Reg(X86Reg::R11);

        self.emit(X86Instr::Mov { dst: r11(), src: rhs });

        // rax = -1 unless the divisor is -1, by the sign of (d+1) | -(d+1)
        self.emit(X86Instr::Mov { dst: rax(), src: r11() });
        self.emit(X86Instr::Alu {
            op: AluOp::Add,
            dst: rax(),
            src: X86Operand::Imm(1),
        });
        self.emit(X86Instr::Mov { dst: rdx(), src: rax() });
        self.emit(X86Instr::Neg { dst: rdx() });
        self.emit(X86Instr::Alu {
            op: AluOp::Or,
            dst: rax(),
            src: rdx(),
        });
        self.emit(X86Instr::Mov {
            dst: rcx(),
            src: X86Operand::Imm(63),
        });
        self.emit(X86Instr::Shift {
            op: ShiftOp::Sar,
            dst: rax(),
            count: X86Reg::Rcx,
        });

        // divisor = ((d - 1) & mask) + 1
        self.emit(X86Instr::Alu {
            op: AluOp::Sub,
            dst: r11(),
            src: X86Operand::Imm(1),
        });
        self.emit(X86Instr::Alu {
            op: AluOp::And,
            dst: r11(),
            src: rax(),
        });
        self.emit(X86Instr::Alu {
            op: AluOp::Add,
            dst: r11(),
            src: X86Operand::Imm(1),
        });
        self.emit(X86Instr::Not { dst: rax() });
        self.emit(X86Instr::Mov { dst: rcx(), src: rax() });

        self.mov(rax(), lhs);
        self.emit(X86Instr::Cqo);
        self.emit(X86Instr::Idiv { src: r11() });
        if op == BinOp::Mod {
            return X86Reg::Rdx;
        }

        // negate the quotient when rcx is all ones
        self.emit(X86Instr::Alu {
            op: AluOp::Xor,
            dst: rax(),
            src: rcx(),
        });
        self.emit(X86Instr::Alu {
            op: AluOp::Sub,
            dst: rax(),
            src: rcx(),
        });
        X86Reg::Rax
    }

    fn lower_binary(&mut self, op: BinOp, dest: &Var, lhs: &Var, rhs: &Var) -> BackendResult<()> {
        let lhs = self.source(lhs)?;
        let rhs = self.source(rhs)?;
        let rax = || X86Operand::Reg(X86Reg::Rax);

        let result = match op {
            BinOp::Div | BinOp::Mod => self.lower_division(op, lhs, rhs),
            BinOp::Shl | BinOp::Shr => {
                self.mov(X86Reg::Rcx.into(), rhs);
                self.mov(rax(), lhs);
                self.emit(X86Instr::Shift {
                    op: if op == BinOp::Shl { ShiftOp::Sal } else { ShiftOp::Sar },
                    dst: rax(),
                    count: X86Reg::Rcx,
                });
                X86Reg::Rax
            }
            _ => {
                let alu = match op {
                    BinOp::Add => AluOp::Add,
                    BinOp::Sub => AluOp::Sub,
                    BinOp::Mul => AluOp::Imul,
                    BinOp::And => AluOp::And,
                    BinOp::Or => AluOp::Or,
                    _ => AluOp::Xor,
                };
                self.mov(rax(), lhs);
                self.emit(X86Instr::Alu {
                    op: alu,
                    dst: rax(),
                    src: rhs,
                });
                X86Reg::Rax
            }
        };

        if let Some(dst) = self.destination(dest)? {
            self.mov(dst, result.into());
        }
        Ok(())
    }

    /// Stage arguments and call. Stack arguments are pushed in reverse with
    /// padding so RSP stays 16-byte aligned at the call.
    fn lower_call(&mut self, func: &str, argc: u32) {
        let in_regs = (argc as usize).min(X86Reg::ARG_REGS.len());
        let on_stack = argc as usize - in_regs;
        let padding = on_stack % 2 == 1;

        if padding {
            self.emit(X86Instr::Alu {
                op: AluOp::Sub,
                dst: X86Reg::Rsp.into(),
                src: X86Operand::Imm(8),
            });
        }
        for index in (in_regs + 1..=argc as usize).rev() {
            let slot = self.frame.staging(index as u32);
            self.emit(X86Instr::Push { src: slot.into() });
        }
        for (i, reg) in X86Reg::ARG_REGS.iter().take(in_regs).enumerate() {
            let slot = self.frame.staging(i as u32 + 1);
            self.emit(X86Instr::Mov {
                dst: (*reg).into(),
                src: slot.into(),
            });
        }

        self.emit(X86Instr::Call {
            target: func.to_string(),
        });

        let popped = 8 * (on_stack + padding as usize);
        if popped > 0 {
            self.emit(X86Instr::Alu {
                op: AluOp::Add,
                dst: X86Reg::Rsp.into(),
                src: X86Operand::Imm(popped as i64),
            });
        }
    }

    /// Save caller-saved registers holding temporaries that are live after a
    /// call, other than the call's own destination.
    fn save_live_registers(&mut self, live_out: &OrdSet<Temp>, dest: Option<&Var>) -> BackendResult<Vec<X86Reg>> {
        let dest_reg = match dest {
            Some(d) => self.destination(d)?.and_then(|d| d.reg()),
            None => None,
        };

        let mut saved: Vec<X86Reg> = Vec::new();
        for t in live_out {
            if let Some(Location::Reg(r)) = self.allocation.location(t)
                && r.is_caller_saved()
                && Some(r) != dest_reg
                && !saved.contains(&r)
            {
                saved.push(r);
            }
        }
        saved.sort();

        for reg in &saved {
            let Some(slot) = self.frame.save_slot(*reg) else {
                return Err(BackendError::unreachable(format!(
                    "no save slot for {} in {}",
                    reg, self.cfg.name
                )));
            };
            self.emit(X86Instr::Mov {
                dst: slot.into(),
                src: (*reg).into(),
            });
        }
        Ok(saved)
    }

    fn restore_registers(&mut self, saved: &[X86Reg]) {
        for reg in saved {
            if let Some(slot) = self.frame.save_slot(*reg) {
                self.emit(X86Instr::Mov {
                    dst: (*reg).into(),
                    src: slot.into(),
                });
            }
        }
    }
}
