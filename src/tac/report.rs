// Pretty error reporting with source highlighting using ariadne

use crate::backend::error::BackendError;
use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};
use chumsky::error::Rich;
use std::fmt;
use std::ops::Range;

use super::Span;

/// A located problem in TAC source text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub label: String,
    pub span: Range<usize>,
    pub help: Option<String>,
}

impl Diagnostic {
    /// Lexer or parser error
    pub fn from_rich<T: fmt::Display>(error: &Rich<'_, T, Span>) -> Self {
        let span = error.span();
        Diagnostic {
            code: "E001",
            message: "Syntax error".to_string(),
            label: error.to_string(),
            span: span.start..span.end,
            help: None,
        }
    }

    /// Instruction or declaration rejected by the checked constructors
    pub fn from_backend(error: &BackendError, span: Span) -> Self {
        let help = match error {
            BackendError::MalformedInstruction { .. } => {
                Some("see the opcode table: each opcode has a fixed operand signature".to_string())
            }
            BackendError::LiteralOutOfRange { .. } => Some(format!(
                "literals must lie between {} and {}",
                i64::MIN,
                i64::MAX
            )),
            _ => None,
        };
        Diagnostic {
            code: error.code(),
            message: "Invalid instruction".to_string(),
            label: error.to_string(),
            span: span.start..span.end,
            help,
        }
    }

    pub fn custom(message: impl Into<String>, label: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            code: "E002",
            message: message.into(),
            label: label.into(),
            span: span.start..span.end,
            help: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {}..{}: {}",
            self.code, self.message, self.span.start, self.span.end, self.label
        )
    }
}

/// Build an ariadne Report from a Diagnostic
fn build_report(diagnostic: &Diagnostic, color: bool) -> Report<'static, Range<usize>> {
    let mut label = Label::new(diagnostic.span.clone()).with_message(&diagnostic.label);
    if color {
        label = label.with_color(Color::Red);
    }

    let mut report = Report::build(ReportKind::Error, diagnostic.span.clone())
        .with_config(
            Config::default()
                .with_color(color)
                .with_index_type(IndexType::Byte),
        )
        .with_code(diagnostic.code)
        .with_message(&diagnostic.message)
        .with_label(label);
    if let Some(help) = &diagnostic.help {
        report = report.with_help(help);
    }
    report.finish()
}

/// Print diagnostics with source highlighting to stderr
pub fn report_diagnostics(filename: &str, source: &str, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        if let Err(e) = build_report(diagnostic, true).eprint(Source::from(source)) {
            log::error!("failed to render diagnostic: {}", e);
            eprintln!("{}", diagnostic);
        }
        eprintln!(
            "  --> {}:{}",
            filename,
            line_col(source, diagnostic.span.start)
        );
    }
}

/// Render one diagnostic without colors
pub fn render_diagnostic(source: &str, diagnostic: &Diagnostic) -> String {
    let mut out = Vec::new();
    match build_report(diagnostic, false).write(Source::from(source), &mut out) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => diagnostic.to_string(),
    }
}

fn line_col(source: &str, offset: usize) -> String {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    format!("{}:{}", line, col)
}
