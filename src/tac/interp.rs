//! TAC Interpreter
//!
//! Executes a [`TacProgram`] directly, starting at `@main`. Used to check that
//! SSA conversion and the optimiser preserve program behaviour.
//!
//! Arithmetic is 64-bit two's complement with wrapping. `print` and calls to
//! `@__bx_print_int` write the decimal value followed by a newline;
//! `@__bx_print_bool` writes `true` or `false`.

use super::instr::{Instr, PhiEdge};
use super::program::{Proc, TacProgram};
use super::types::{Global, Label, Temp, Var};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use thiserror::Error;

pub const PRINT_INT: &str = "__bx_print_int";
pub const PRINT_BOOL: &str = "__bx_print_bool";

const DEFAULT_STEP_LIMIT: u64 = 10_000_000;
const MAX_CALL_DEPTH: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpError {
    #[error("program has no @main procedure")]
    NoMain,

    #[error("call to unknown procedure @{0}")]
    UnknownProcedure(String),

    #[error("@{proc} expects {expected} argument(s) but was called with {found}")]
    ArityMismatch {
        proc: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of the call to @{proc} was never staged with `param`")]
    MissingArgument { proc: String, index: u32 },

    #[error("division by zero in @{0}")]
    DivisionByZero(String),

    #[error("read of uninitialized temporary {temp} in @{proc}")]
    Uninitialized { proc: String, temp: Temp },

    #[error("unknown global variable {0}")]
    UnknownGlobal(Global),

    #[error("jump to undefined label {label} in @{proc}")]
    UnknownLabel { proc: String, label: Label },

    #[error("step limit of {0} instructions exceeded")]
    StepLimit(u64),

    #[error("call depth limit of {0} exceeded")]
    CallDepth(usize),

    #[error("cannot write program output: {0}")]
    Output(String),
}

/// Interpreter state shared by all activations
pub struct Interpreter<'p, W: Write> {
    program: &'p TacProgram,
    globals: HashMap<Global, i64>,
    out: W,
    steps: u64,
    step_limit: u64,
}

/// Registers of one procedure activation
struct Frame<'p> {
    proc: &'p Proc,
    temps: HashMap<Temp, i64>,
    labels: HashMap<&'p Label, usize>,
}

impl<'p> Frame<'p> {
    fn read(&self, var: &Var, globals: &HashMap<Global, i64>) -> Result<i64, InterpError> {
        match var {
            Var::Temp(t) if t.is_sink() => Ok(0),
            Var::Temp(t) => self.temps.get(t).copied().ok_or_else(|| InterpError::Uninitialized {
                proc: self.proc.name.name().to_string(),
                temp: t.clone(),
            }),
            Var::Global(g) => globals
                .get(g)
                .copied()
                .ok_or_else(|| InterpError::UnknownGlobal(g.clone())),
        }
    }

    fn write(
        &mut self,
        var: &Var,
        value: i64,
        globals: &mut HashMap<Global, i64>,
    ) -> Result<(), InterpError> {
        match var {
            Var::Temp(t) if t.is_sink() => {}
            Var::Temp(t) => {
                self.temps.insert(t.clone(), value);
            }
            Var::Global(g) => match globals.get_mut(g) {
                Some(slot) => *slot = value,
                None => return Err(InterpError::UnknownGlobal(g.clone())),
            },
        }
        Ok(())
    }

    fn jump(&self, label: &Label) -> Result<usize, InterpError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| InterpError::UnknownLabel {
                proc: self.proc.name.name().to_string(),
                label: label.clone(),
            })
    }
}

impl<'p, W: Write> Interpreter<'p, W> {
    pub fn new(program: &'p TacProgram, out: W) -> Self {
        let globals = program
            .globals
            .iter()
            .map(|g| (g.name.clone(), g.value))
            .collect();
        Self {
            program,
            globals,
            out,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Run `@main` to completion and return its result.
    pub fn run(&mut self) -> Result<i64, InterpError> {
        if self.program.proc("main").is_none() {
            return Err(InterpError::NoMain);
        }
        self.call("main", Vec::new(), 0)
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) -> Result<(), InterpError> {
        writeln!(self.out, "{}", text).map_err(|e| InterpError::Output(e.to_string()))
    }

    fn call(&mut self, name: &str, args: Vec<i64>, depth: usize) -> Result<i64, InterpError> {
        if depth > MAX_CALL_DEPTH {
            return Err(InterpError::CallDepth(MAX_CALL_DEPTH));
        }

        match name {
            PRINT_INT | PRINT_BOOL => {
                if args.len() != 1 {
                    return Err(InterpError::ArityMismatch {
                        proc: name.to_string(),
                        expected: 1,
                        found: args.len(),
                    });
                }
                let text = if name == PRINT_INT {
                    args[0].to_string()
                } else if args[0] != 0 {
                    "true".to_string()
                } else {
                    "false".to_string()
                };
                self.emit(&text)?;
                return Ok(0);
            }
            _ => {}
        }

        let program = self.program;
        let proc = program
            .proc(name)
            .ok_or_else(|| InterpError::UnknownProcedure(name.to_string()))?;
        if proc.params.len() != args.len() {
            return Err(InterpError::ArityMismatch {
                proc: name.to_string(),
                expected: proc.params.len(),
                found: args.len(),
            });
        }

        let labels = proc
            .body
            .iter()
            .enumerate()
            .filter_map(|(i, instr)| match instr {
                Instr::Label(l) => Some((l, i)),
                _ => None,
            })
            .collect();
        let mut frame = Frame {
            proc,
            temps: proc.params.iter().cloned().zip(args).collect(),
            labels,
        };

        let mut staged: BTreeMap<u32, i64> = BTreeMap::new();
        let mut prev = PhiEdge::Entry;
        let mut current = PhiEdge::Entry;
        let mut pc = 0;

        while pc < proc.body.len() {
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(InterpError::StepLimit(self.step_limit));
            }

            let instr = &proc.body[pc];
            pc += 1;
            match instr {
                Instr::Nop => {}
                Instr::Label(l) => {
                    prev = std::mem::replace(&mut current, PhiEdge::Block(l.clone()));
                }
                Instr::Phi { .. } => {
                    // The whole phi group reads before any of it writes.
                    // An undefined incoming value leaves the destination undefined.
                    let start = pc - 1;
                    let end = proc.body[start..]
                        .iter()
                        .position(|i| !i.is_phi())
                        .map_or(proc.body.len(), |n| start + n);
                    let mut values = Vec::new();
                    for phi in &proc.body[start..end] {
                        if let Instr::Phi { dest, args } = phi
                            && let Some(v) = args.get(&prev).and_then(|src| frame.temps.get(src))
                        {
                            values.push((dest.clone(), *v));
                        }
                    }
                    for (dest, v) in values {
                        frame.temps.insert(dest, v);
                    }
                    pc = end;
                }
                Instr::Jmp(l) => pc = frame.jump(l)?,
                Instr::Branch { cond, arg, target } => {
                    if cond.holds(frame.read(arg, &self.globals)?) {
                        pc = frame.jump(target)?;
                    }
                }
                Instr::Binary { op, dest, lhs, rhs } => {
                    let a = frame.read(lhs, &self.globals)?;
                    let b = frame.read(rhs, &self.globals)?;
                    let v = op
                        .eval(a, b)
                        .ok_or_else(|| InterpError::DivisionByZero(name.to_string()))?;
                    frame.write(dest, v, &mut self.globals)?;
                }
                Instr::Unary { op, dest, arg } => {
                    let v = op.eval(frame.read(arg, &self.globals)?);
                    frame.write(dest, v, &mut self.globals)?;
                }
                Instr::Const { dest, value } => frame.write(dest, *value, &mut self.globals)?,
                Instr::Copy { dest, src } => {
                    let v = frame.read(src, &self.globals)?;
                    frame.write(dest, v, &mut self.globals)?;
                }
                Instr::Param { index, arg } => {
                    let v = frame.read(arg, &self.globals)?;
                    staged.insert(*index, v);
                }
                Instr::Call { dest, func, argc } => {
                    let mut args = Vec::with_capacity(*argc as usize);
                    for index in 1..=*argc {
                        let v = staged.get(&index).copied().ok_or_else(|| {
                            InterpError::MissingArgument {
                                proc: func.name().to_string(),
                                index,
                            }
                        })?;
                        args.push(v);
                    }
                    staged.clear();
                    let v = self.call(func.name(), args, depth + 1)?;
                    frame.write(dest, v, &mut self.globals)?;
                }
                Instr::Ret { arg } => return frame.read(arg, &self.globals),
                Instr::Print { arg } => {
                    let v = frame.read(arg, &self.globals)?;
                    self.emit(&v.to_string())?;
                }
            }
        }

        Ok(0)
    }
}

/// Run a program and capture everything it prints.
pub fn run_program(program: &TacProgram) -> Result<String, InterpError> {
    let mut interp = Interpreter::new(program, Vec::new());
    interp.run()?;
    Ok(String::from_utf8_lossy(&interp.into_output()).into_owned())
}
