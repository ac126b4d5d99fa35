use std::process::ExitCode;
use tacc::cli::{
    Config, PipelineError, print_failure, print_procedure_errors, read_source_file, run_pipeline,
    write_output,
};
use tacc::tac::report_diagnostics;

fn main() -> ExitCode {
    // Parse configuration
    let config = Config::from_args();

    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();

    // Read the source file
    let src = match read_source_file(&config.input) {
        Ok(content) => content,
        Err(e) => {
            print_failure(&e);
            return ExitCode::FAILURE;
        }
    };

    let filename = config.input.display().to_string();
    let result = run_pipeline(&config, &src).and_then(|text| write_output(&config, &text));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(PipelineError::Syntax(diagnostics)) => {
            report_diagnostics(&filename, &src, &diagnostics);
            print_failure(&format!("{} error(s) in {}", diagnostics.len(), filename));
            ExitCode::FAILURE
        }
        Err(PipelineError::Compile(errors)) => {
            print_procedure_errors(&filename, &errors);
            ExitCode::FAILURE
        }
        Err(e) => {
            print_failure(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
