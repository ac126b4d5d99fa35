use crate::backend::cfg::ControlFlowGraph;
use crate::backend::names::NameGen;
use crate::tac::instr::Instr;
use crate::tac::program::{Proc, TacProgram};
use crate::tac::types::Label;
use crate::tac::parse_program;

/// Straight-line arithmetic with more simultaneously live values than a
/// small register budget
pub const PRESSURE: &str = r#"
proc @main():
  %a = const 1;
  %b = const 2;
  %c = const 3;
  %d = const 4;
  %e = const 5;
  %f = add %a, %b;
  %g = mul %c, %d;
  %h = sub %e, %a;
  %x = add %f, %g;
  %x = add %x, %h;
  %x = add %x, %b;
  %x = add %x, %c;
  %y = div %x, %d;
  %z = mod %x, %e;
  print %y;
  print %z;
  %s = shl %e, %b;
  %t = neg %s;
  %u = shr %t, %a;
  print %u;
  ret;
"#;

/// Sum of the odd numbers below 10, leaving early at 7
pub const BREAK_CONTINUE: &str = r#"
proc @main():
  %i = const 0;
  %s = const 0;
  %one = const 1;
  %stop = const 7;
  %ten = const 10;
.Lhead:
  %c = sub %i, %ten;
  jnl %c, .Lexit;
  %i = add %i, %one;
  %odd = and %i, %one;
  jz %odd, .Lhead;
  %d = sub %i, %stop;
  jz %d, .Lexit;
  %s = add %s, %i;
  jmp .Lhead;
.Lexit:
  print %s;
  ret;
"#;

/// Loop-carried swap: phi sources and destinations form a cycle
pub const SWAP: &str = r#"
proc @main():
  %x = const 1;
  %y = const 2;
  %n = const 3;
.Lloop:
  jz %n, .Ldone;
  %t = copy %x;
  %x = copy %y;
  %y = copy %t;
  %one = const 1;
  %n = sub %n, %one;
  jmp .Lloop;
.Ldone:
  print %x;
  print %y;
  ret;
"#;

/// Calls with register and stack arguments, return values and globals
pub const CALLS: &str = r#"
var @base = 100;
proc @main():
  %a = const 2;
  %b = const 3;
  param 1, %a;
  param 2, %b;
  %r = call @addbase, 2;
  print %r;
  %k1 = const 1;
  %k2 = const 2;
  %k3 = const 3;
  %k4 = const 4;
  %k5 = const 5;
  %k6 = const 6;
  %k7 = const 7;
  %k8 = const 8;
  param 1, %k1;
  param 2, %k2;
  param 3, %k3;
  param 4, %k4;
  param 5, %k5;
  param 6, %k6;
  param 7, %k7;
  param 8, %k8;
  %s = call @sum8, 8;
  print %s;
  print %a;
  print @base;
  ret;
proc @addbase(%x, %y):
  %t = add %x, %y;
  %t = add %t, @base;
  @base = copy %t;
  ret %t;
proc @sum8(%p1, %p2, %p3, %p4, %p5, %p6, %p7, %p8):
  %s = add %p1, %p2;
  %s = add %s, %p3;
  %s = add %s, %p4;
  %s = add %s, %p5;
  %s = add %s, %p6;
  %s = add %s, %p7;
  %s = add %s, %p8;
  ret %s;
"#;

/// Doubly recursive Fibonacci
pub const FIB: &str = r#"
proc @main():
  %n = const 10;
  param 1, %n;
  %r = call @fib, 1;
  print %r;
  ret;
proc @fib(%n):
  %two = const 2;
  %c = sub %n, %two;
  jnl %c, .Lrec;
  ret %n;
.Lrec:
  %one = const 1;
  %a = sub %n, %one;
  param 1, %a;
  %fa = call @fib, 1;
  %b = sub %n, %two;
  param 1, %b;
  %fb = call @fib, 1;
  %s = add %fa, %fb;
  ret %s;
"#;

/// Every test program with the output it prints
pub const PROGRAMS: &[(&str, &str, &str)] = &[
    ("pressure", PRESSURE, "6\n4\n-10\n"),
    ("break_continue", BREAK_CONTINUE, "9\n"),
    ("swap", SWAP, "2\n1\n"),
    ("calls", CALLS, "105\n36\n2\n105\n"),
    ("fib", FIB, "55\n"),
];

/// Parse TAC text, panicking with every diagnostic on failure
pub fn parse(src: &str) -> TacProgram {
    match parse_program(src) {
        Ok(program) => program,
        Err(diagnostics) => {
            let messages: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
            panic!("parse failed:\n{}", messages.join("\n"))
        }
    }
}

/// Build a CFG with a name generator seeded the way the pipeline does
pub fn cfg_of(proc: &Proc) -> (ControlFlowGraph, NameGen) {
    let labels: Vec<&Label> = proc
        .body
        .iter()
        .filter_map(|i| match i {
            Instr::Label(l) => Some(l),
            _ => None,
        })
        .collect();
    let mut names = NameGen::new(labels);
    let cfg = ControlFlowGraph::build(proc, &mut names).unwrap();
    (cfg, names)
}

/// Every procedure of every test program
pub fn all_procs() -> Vec<(String, Proc)> {
    PROGRAMS
        .iter()
        .flat_map(|(name, src, _)| {
            parse(src)
                .procs
                .into_iter()
                .map(move |p| (format!("{}{}", name, p.name), p))
        })
        .collect()
}
