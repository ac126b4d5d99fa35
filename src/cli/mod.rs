pub mod cli;
pub mod display;
pub mod pipeline;

pub use cli::{Config, EmitKind, read_source_file};
pub use display::{format_allocation, print_failure, print_procedure_errors};
pub use pipeline::{PipelineError, run_pipeline, write_output};
