//! TAC Parser
//!
//! Parsing runs in two stages. The chumsky grammar produces raw instructions
//! (an opcode name plus untyped operands, each with its span); `build_program`
//! then runs every raw instruction through the checked constructors of
//! [`Instr`], so well-formedness errors are reported against the source text.

use super::instr::{Instr, Operand, PhiEdge, parse_literal};
use super::lexer::{Token, lexer};
use super::program::{GlobalVar, Proc, TacProgram};
use super::report::Diagnostic;
use super::types::{Global, Label, Temp};
use super::{Span, Spanned};
use chumsky::{input::ValueInput, prelude::*};
use std::collections::HashSet;

/// Operands of a raw instruction
#[derive(Clone, Debug, PartialEq)]
pub enum RawArgs {
    Plain(Vec<Operand>),
    Phi(Vec<(PhiEdge, Operand)>),
}

/// An instruction before operand-kind checking
#[derive(Clone, Debug, PartialEq)]
pub struct RawInstr {
    pub dest: Option<Operand>,
    pub opcode: String,
    pub args: RawArgs,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawItem {
    Label(Label),
    Instr(RawInstr),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawDecl {
    Var {
        name: Global,
        value: String,
        span: Span,
    },
    Proc {
        name: Global,
        params: Vec<Temp>,
        items: Vec<RawItem>,
        span: Span,
    },
}

type ParserError<'tokens, 'src> = extra::Err<Rich<'tokens, Token<'src>, Span>>;

// Operand parser
fn operand_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Operand, ParserError<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = Span>,
{
    choice((
        temp_parser().map(Operand::Temp),
        select! { Token::Global(g) => Operand::Global(Global::new(g)) },
        select! { Token::Label(l) => Operand::Label(Label::new(l)) },
        select! { Token::Num(n) => Operand::Int(n.to_string()) },
    ))
    .labelled("operand")
}

fn temp_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Temp, ParserError<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = Span>,
{
    select! { Token::Temp(t) => t }
        .try_map(|t: &str, span| {
            Temp::parse(t).ok_or_else(|| Rich::custom(span, format!("invalid temporary `%{}`", t)))
        })
        .labelled("temporary")
}

// Instruction parser
pub fn item_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, RawItem, ParserError<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = Span>,
{
    let operand = operand_parser();

    let dest = temp_parser()
        .map(Operand::Temp)
        .or(select! { Token::Global(g) => Operand::Global(Global::new(g)) })
        .then_ignore(just(Token::Ctrl('=')))
        .or_not();

    let opcode = select! { Token::Ident(op) => op.to_string() }.labelled("opcode");

    let phi_edge = select! {
        Token::Label(l) => PhiEdge::Block(Label::new(l)),
        Token::Ident("entry") => PhiEdge::Entry,
    };

    let phi_args = phi_edge
        .then_ignore(just(Token::Ctrl(':')))
        .then(operand.clone())
        .separated_by(just(Token::Ctrl(',')))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::Ctrl('(')), just(Token::Ctrl(')')))
        .map(RawArgs::Phi);

    let plain_args = operand
        .separated_by(just(Token::Ctrl(',')))
        .collect::<Vec<_>>()
        .map(RawArgs::Plain);

    let instr = dest
        .then(opcode)
        .then(phi_args.or(plain_args))
        .then_ignore(just(Token::Ctrl(';')))
        .map_with(|((dest, opcode), args), e| {
            RawItem::Instr(RawInstr {
                dest,
                opcode,
                args,
                span: e.span(),
            })
        })
        .labelled("instruction");

    let label = select! { Token::Label(l) => RawItem::Label(Label::new(l)) }
        .then_ignore(just(Token::Ctrl(':')));

    label.or(instr)
}

// Program parser
pub fn program_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Vec<RawDecl>, ParserError<'tokens, 'src>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = Span>,
{
    let global = select! { Token::Global(g) => Global::new(g) }.labelled("global name");

    let var_decl = just(Token::Var)
        .ignore_then(global.clone())
        .then_ignore(just(Token::Ctrl('=')))
        .then(select! { Token::Num(n) => n.to_string() })
        .then_ignore(just(Token::Ctrl(';')))
        .map_with(|(name, value), e| RawDecl::Var {
            name,
            value,
            span: e.span(),
        })
        .labelled("global variable");

    let params = temp_parser()
        .separated_by(just(Token::Ctrl(',')))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::Ctrl('(')), just(Token::Ctrl(')')));

    let proc_decl = just(Token::Proc)
        .ignore_then(global)
        .then(params)
        .then_ignore(just(Token::Ctrl(':')))
        .then(item_parser().repeated().collect::<Vec<_>>())
        .map_with(|((name, params), items), e| RawDecl::Proc {
            name,
            params,
            items,
            span: e.span(),
        })
        .labelled("procedure");

    var_decl
        .or(proc_decl)
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

/// Convert a raw instruction into a checked [`Instr`].
pub fn build_instr(raw: RawInstr) -> Result<Spanned<Instr>, Diagnostic> {
    let span = raw.span;
    let instr = match raw.args {
        RawArgs::Phi(args) => {
            if raw.opcode != "phi" {
                return Err(Diagnostic::custom(
                    "Invalid instruction",
                    format!("only `phi` takes `edge: temporary` pairs, found `{}`", raw.opcode),
                    span,
                ));
            }
            let dest = raw.dest.ok_or_else(|| {
                Diagnostic::custom("Invalid instruction", "phi needs a destination", span)
            })?;
            Instr::phi(dest, args)
        }
        RawArgs::Plain(args) => Instr::build(&raw.opcode, raw.dest, args),
    };
    instr
        .map(|i| (i, span))
        .map_err(|e| Diagnostic::from_backend(&e, span))
}

/// Check raw declarations and assemble the program, collecting every diagnostic.
pub fn build_program(decls: Vec<RawDecl>) -> Result<TacProgram, Vec<Diagnostic>> {
    let mut program = TacProgram::default();
    let mut diagnostics = Vec::new();
    let mut names = HashSet::new();

    for decl in decls {
        match decl {
            RawDecl::Var { name, value, span } => {
                if !names.insert(name.clone()) {
                    diagnostics.push(Diagnostic::custom(
                        "Duplicate declaration",
                        format!("{} is declared more than once", name),
                        span,
                    ));
                }
                match parse_literal(&value) {
                    Ok(value) => program.globals.push(GlobalVar { name, value }),
                    Err(e) => diagnostics.push(Diagnostic::from_backend(&e, span)),
                }
            }
            RawDecl::Proc {
                name,
                params,
                items,
                span,
            } => {
                if !names.insert(name.clone()) {
                    diagnostics.push(Diagnostic::custom(
                        "Duplicate declaration",
                        format!("{} is declared more than once", name),
                        span,
                    ));
                }
                let mut body = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        RawItem::Label(l) => body.push(Instr::Label(l)),
                        RawItem::Instr(raw) => match build_instr(raw) {
                            Ok((instr, _)) => body.push(instr),
                            Err(d) => diagnostics.push(d),
                        },
                    }
                }
                program.procs.push(Proc { name, params, body });
            }
        }
    }

    if diagnostics.is_empty() {
        Ok(program)
    } else {
        Err(diagnostics)
    }
}

/// Lex, parse and check a TAC source text.
pub fn parse_program(src: &str) -> Result<TacProgram, Vec<Diagnostic>> {
    let (tokens, lex_errors) = lexer().parse(src).into_output_errors();
    let mut diagnostics: Vec<Diagnostic> = lex_errors.iter().map(Diagnostic::from_rich).collect();

    let tokens = match tokens {
        Some(t) => t,
        None => return Err(diagnostics),
    };
    log::trace!("lexed {} tokens", tokens.len());

    let eoi: Span = (src.len()..src.len()).into();
    let (decls, parse_errors) = program_parser()
        .parse(tokens.as_slice().map(eoi, |(t, s)| (t, s)))
        .into_output_errors();
    diagnostics.extend(parse_errors.iter().map(Diagnostic::from_rich));

    match decls {
        Some(decls) if diagnostics.is_empty() => build_program(decls),
        _ => Err(diagnostics),
    }
}
