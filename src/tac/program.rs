//! TAC program structure

use super::instr::Instr;
use super::types::{Global, Temp};
use std::fmt;

/// `var @name = value;`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalVar {
    pub name: Global,
    pub value: i64,
}

/// `proc @name(%a, %b): body`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proc {
    pub name: Global,
    pub params: Vec<Temp>,
    pub body: Vec<Instr>,
}

impl Proc {
    pub fn new(name: impl Into<String>, params: Vec<Temp>, body: Vec<Instr>) -> Self {
        Self {
            name: Global::new(name),
            params,
            body,
        }
    }
}

impl fmt::Display for Proc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        writeln!(f, "proc {}({}):", self.name, params.join(", "))?;
        for instr in &self.body {
            match instr {
                Instr::Label(_) => writeln!(f, "{}", instr)?,
                _ => writeln!(f, "  {}", instr)?,
            }
        }
        Ok(())
    }
}

/// A whole compilation unit
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TacProgram {
    pub globals: Vec<GlobalVar>,
    pub procs: Vec<Proc>,
}

impl TacProgram {
    pub fn proc(&self, name: &str) -> Option<&Proc> {
        self.procs.iter().find(|p| p.name.name() == name)
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVar> {
        self.globals.iter().find(|g| g.name.name() == name)
    }
}

impl fmt::Display for TacProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for g in &self.globals {
            writeln!(f, "var {} = {};", g.name, g.value)?;
        }
        for p in &self.procs {
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac::types::{Label, Var};

    #[test]
    fn test_program_display() {
        let program = TacProgram {
            globals: vec![GlobalVar {
                name: Global::new("x"),
                value: 42,
            }],
            procs: vec![Proc::new(
                "main",
                vec![],
                vec![
                    Instr::Label(Label::new("1")),
                    Instr::Print {
                        arg: Var::Global(Global::new("x")),
                    },
                    Instr::Ret { arg: Var::sink() },
                ],
            )],
        };
        assert_eq!(
            program.to_string(),
            "var @x = 42;\nproc @main():\n.L1:\n  print @x;\n  ret;\n"
        );
        assert!(program.proc("main").is_some());
        assert_eq!(program.global("x").map(|g| g.value), Some(42));
    }
}
