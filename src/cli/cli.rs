use crate::backend::optimise::OptConfig;
use crate::pipeline::CompileOptions;
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

/// What the compiler writes out
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmitKind {
    /// The parsed program
    Tac,
    /// TAC after SSA conversion and optimisation
    Ssa,
    /// Each procedure's register assignment
    Alloc,
    /// x86-64 assembly
    Asm,
}

/// Configuration for the CLI application
#[derive(Parser, Debug)]
#[command(name = "tacc")]
#[command(about = "Compile three-address code to x86-64 assembly", long_about = None)]
#[command(version)]
pub struct Config {
    /// TAC source file
    pub input: PathBuf,

    /// Output file (`-` for stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stage to emit
    #[arg(long, value_enum, default_value_t = EmitKind::Asm)]
    pub emit: EmitKind,

    /// Run the program with the TAC interpreter instead of compiling it
    #[arg(long)]
    pub interpret: bool,

    /// Allocate registers on the raw TAC
    #[arg(long)]
    pub no_ssa: bool,

    /// Keep every phi inserted by SSA construction
    #[arg(long)]
    pub no_minimize: bool,

    /// Disable copy propagation and dead-code elimination
    #[arg(long)]
    pub no_opt: bool,

    /// Number of allocatable registers
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub registers: u8,

    /// Skip checking the emitted instructions
    #[arg(long)]
    pub no_verify: bool,

    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    /// Parse command line arguments
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            ssa: !self.no_ssa,
            minimize: !self.no_minimize,
            optimise: if self.no_opt { OptConfig::none() } else { OptConfig::all() },
            registers: self.registers as usize,
            verify: !self.no_verify,
        }
    }

    /// Default log filter for the verbosity flags
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Where the output goes; `None` means stdout.
    ///
    /// Assembly defaults to the input path with an `.s` extension, every other
    /// stage to stdout.
    pub fn output_path(&self) -> Option<PathBuf> {
        match &self.output {
            Some(path) if path.as_os_str() == "-" => None,
            Some(path) => Some(path.clone()),
            None if self.emit == EmitKind::Asm && !self.interpret => Some(self.input.with_extension("s")),
            None => None,
        }
    }
}

/// Read the source file from the given path
pub fn read_source_file(file_path: &Path) -> Result<String, String> {
    fs::read_to_string(file_path).map_err(|e| {
        format!(
            "Error reading file '{}': {}\n\n\
            Usage: tacc <INPUT> [-o OUTPUT] [--emit tac|ssa|alloc|asm]",
            file_path.display(),
            e
        )
    })
}
