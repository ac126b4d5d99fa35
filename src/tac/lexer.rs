use super::{Span, Spanned};
use chumsky::prelude::*;
use std::fmt;

/// TAC tokens
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token<'src> {
    /// `%name`, without the sigil
    Temp(&'src str),
    /// `@name`, without the sigil
    Global(&'src str),
    /// `.Lname`, with its prefix
    Label(&'src str),
    /// Decimal literal, optionally negative
    Num(&'src str),
    /// Opcode names and the `entry` phi edge
    Ident(&'src str),
    Var,
    Proc,
    Ctrl(char),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Temp(t) => write!(f, "%{}", t),
            Token::Global(g) => write!(f, "@{}", g),
            Token::Label(l) => write!(f, "{}", l),
            Token::Num(n) => write!(f, "{}", n),
            Token::Ident(i) => write!(f, "{}", i),
            Token::Var => write!(f, "var"),
            Token::Proc => write!(f, "proc"),
            Token::Ctrl(c) => write!(f, "{}", c),
        }
    }
}

// Lexer
pub fn lexer<'src>()
-> impl Parser<'src, &'src str, Vec<Spanned<Token<'src>>>, extra::Err<Rich<'src, char, Span>>> {
    let name_char = |c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '.';

    let ident = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
                .repeated(),
        )
        .to_slice();

    let temp = just('%')
        .ignore_then(any().filter(name_char).repeated().at_least(1).to_slice())
        .map(Token::Temp);

    let global = just('@').ignore_then(ident.clone()).map(Token::Global);

    let label = just(".L")
        .then(any().filter(name_char).repeated().at_least(1))
        .to_slice()
        .map(Token::Label);

    let num = just('-')
        .or_not()
        .then(text::int(10))
        .to_slice()
        .map(Token::Num);

    let word = ident.map(|word: &str| match word {
        "var" => Token::Var,
        "proc" => Token::Proc,
        _ => Token::Ident(word),
    });

    let ctrl = one_of("(),;:=").map(Token::Ctrl);

    let token = choice((temp, global, label, num, word, ctrl));

    let comment = just("//")
        .then(any().and_is(just('\n').not()).repeated())
        .padded();

    token
        .map_with(|tok, e| (tok, e.span()))
        .padded_by(comment.repeated())
        .padded()
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token<'_>> {
        lexer()
            .parse(src)
            .into_result()
            .expect("lexing failed")
            .into_iter()
            .map(|(tok, _)| tok)
            .collect()
    }

    #[test]
    fn test_lex_instruction() {
        assert_eq!(
            lex("%2 = add %0, %x.1;"),
            vec![
                Token::Temp("2"),
                Token::Ctrl('='),
                Token::Ident("add"),
                Token::Temp("0"),
                Token::Ctrl(','),
                Token::Temp("x.1"),
                Token::Ctrl(';'),
            ]
        );
    }

    #[test]
    fn test_lex_declarations_and_comments() {
        assert_eq!(
            lex("var @g = -3; // trailing\nproc @main():\n.L_bb0:"),
            vec![
                Token::Var,
                Token::Global("g"),
                Token::Ctrl('='),
                Token::Num("-3"),
                Token::Ctrl(';'),
                Token::Proc,
                Token::Global("main"),
                Token::Ctrl('('),
                Token::Ctrl(')'),
                Token::Ctrl(':'),
                Token::Label(".L_bb0"),
                Token::Ctrl(':'),
            ]
        );
    }

    #[test]
    fn test_token_spans() {
        let tokens = lexer().parse("  print %7;").into_result().unwrap();
        assert_eq!(tokens[1].1, SimpleSpan::from(8..10));
    }
}
