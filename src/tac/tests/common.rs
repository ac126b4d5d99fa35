use crate::tac::{TacProgram, parse_program};

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
