use super::common::parse;
use crate::backend::error::BackendError;
use crate::tac::instr::{BinOp, Cond, Instr, PhiEdge};
use crate::tac::types::{Global, Label, Temp, Var};
use crate::tac::{parse_program, render_diagnostic};

fn tv(name: &str) -> Var {
    Var::Temp(Temp::new(name))
}

#[test]
fn test_parse_straight_line_proc() {
    let program = parse(
        "proc @main():\n  %0 = const 5;\n  %1 = const 7;\n  %2 = add %0, %1;\n  print %2;\n",
    );
    assert_eq!(program.procs.len(), 1);
    let main = &program.procs[0];
    assert_eq!(main.name, Global::new("main"));
    assert!(main.params.is_empty());
    assert_eq!(
        main.body,
        vec![
            Instr::Const { dest: tv("0"), value: 5 },
            Instr::Const { dest: tv("1"), value: 7 },
            Instr::Binary {
                op: BinOp::Add,
                dest: tv("2"),
                lhs: tv("0"),
                rhs: tv("1"),
            },
            Instr::Print { arg: tv("2") },
        ]
    );
}

#[test]
fn test_parse_globals_params_and_labels() {
    let program = parse(
        r#"
        // globals first
        var @limit = -4;
        proc @f(%a, %b):
        .L1:
          jz %a, .L2;
          %a = sub %a, %b;
          jmp .L1;
        .L2:
          ret @limit;
        "#,
    );
    assert_eq!(program.globals[0].value, -4);
    let f = program.proc("f").unwrap();
    assert_eq!(f.params, vec![Temp::new("a"), Temp::new("b")]);
    assert_eq!(f.body[0], Instr::Label(Label::new("1")));
    assert_eq!(
        f.body[1],
        Instr::Branch {
            cond: Cond::Z,
            arg: tv("a"),
            target: Label::new("2"),
        }
    );
    assert_eq!(
        f.body[5],
        Instr::Ret {
            arg: Var::Global(Global::new("limit"))
        }
    );
}

#[test]
fn test_parse_phi_and_versioned_temps() {
    let program = parse("proc @g(%x):\n.L0:\n  %x.2 = phi (entry: %x, .L0: %x.3);\n  %x.3 = add %x.2, %x.2;\n  jmp .L0;\n");
    let g = &program.procs[0];
    match &g.body[1] {
        Instr::Phi { dest, args } => {
            assert_eq!(dest, &Temp::versioned("x", 2));
            assert_eq!(args.get(&PhiEdge::Entry), Some(&Temp::new("x")));
            assert_eq!(
                args.get(&PhiEdge::Block(Label::new("0"))),
                Some(&Temp::versioned("x", 3))
            );
        }
        other => panic!("expected phi, got {}", other),
    }
}

#[test]
fn test_printed_program_parses_back() {
    let src = "var @g = 3;\nproc @main():\n  param 1, @g;\n  %r = call @sq, 1;\n  print %r;\n  ret;\nproc @sq(%n):\n  %m = mul %n, %n;\n  ret %m;\n";
    let program = parse(src);
    assert_eq!(program.to_string(), src);
    assert_eq!(parse(&program.to_string()), program);
}

#[test]
fn test_malformed_instruction_is_located() {
    let src = "proc @main():\n  %0 = add %1, .L3;\n";
    let diagnostics = parse_program(src).unwrap_err();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, "E101");
    assert_eq!(&src[diagnostics[0].span.clone()], "%0 = add %1, .L3;");
}

#[test]
fn test_literal_out_of_range_reported() {
    let src = "proc @main():\n  %0 = const 18446744073709551616;\n";
    let diagnostics = parse_program(src).unwrap_err();
    let expected = BackendError::LiteralOutOfRange {
        literal: "18446744073709551616".to_string(),
    };
    assert_eq!(diagnostics[0].label, expected.to_string());
    assert!(render_diagnostic(src, &diagnostics[0]).contains("E102"));
}

#[test]
fn test_syntax_error_reported() {
    let diagnostics = parse_program("proc @main(:\n  nop;\n").unwrap_err();
    assert!(!diagnostics.is_empty());
    assert_eq!(diagnostics[0].code, "E001");
}

#[test]
fn test_duplicate_declaration_reported() {
    let diagnostics = parse_program("var @x = 1;\nvar @x = 2;\n").unwrap_err();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].label.contains("@x"));
}
