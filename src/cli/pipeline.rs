use super::cli::{Config, EmitKind};
use super::display::format_allocation;
use crate::pipeline::{ProcedureError, compile_program};
use crate::tac::interp::{InterpError, run_program};
use crate::tac::report::Diagnostic;
use crate::tac::parse_program;
use std::io::Write;
use std::path::PathBuf;
use std::{fs, io};
use thiserror::Error;

/// Pipeline error types
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("{} syntax error(s)", .0.len())]
    Syntax(Vec<Diagnostic>),

    #[error("{} procedure(s) failed to compile", .0.len())]
    Compile(Vec<ProcedureError>),

    #[error("interpreter: {0}")]
    Interp(#[from] InterpError),
}

/// Run the configured stages on `src` and return the text to write out
pub fn run_pipeline(config: &Config, src: &str) -> Result<String, PipelineError> {
    let program = parse_program(src).map_err(PipelineError::Syntax)?;
    log::debug!(
        "parsed {} procedure(s), {} global(s)",
        program.procs.len(),
        program.globals.len()
    );

    if config.interpret {
        return Ok(run_program(&program)?);
    }
    if config.emit == EmitKind::Tac {
        return Ok(program.to_string());
    }

    let compiled = compile_program(&program, &config.compile_options()).map_err(PipelineError::Compile)?;
    let text = match config.emit {
        EmitKind::Ssa => compiled.tac(&program).to_string(),
        EmitKind::Alloc => format_allocation(&compiled),
        _ => compiled.listing(),
    };
    Ok(text)
}

/// Write pipeline output to the configured destination
pub fn write_output(config: &Config, text: &str) -> Result<(), PipelineError> {
    match config.output_path() {
        Some(path) => fs::write(&path, text).map_err(|source| PipelineError::Io { path, source }),
        None => io::stdout()
            .write_all(text.as_bytes())
            .map_err(|source| PipelineError::Io {
                path: PathBuf::from("<stdout>"),
                source,
            }),
    }
}
