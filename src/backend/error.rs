//! Backend error kinds

use thiserror::Error;

/// Structural errors raised while building instructions, CFGs and allocations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("malformed `{opcode}` instruction: {reason}")]
    MalformedInstruction { opcode: String, reason: String },

    #[error("integer literal {literal} does not fit in 64 bits")]
    LiteralOutOfRange { literal: String },

    #[error("jump to undefined label {label}")]
    UnknownLabel { label: String },

    #[error("label {label} is defined more than once")]
    DuplicateLabel { label: String },

    #[error("internal invariant violated: {reason}")]
    UnreachableState { reason: String },
}

impl BackendError {
    pub fn malformed(opcode: impl Into<String>, reason: impl Into<String>) -> Self {
        BackendError::MalformedInstruction {
            opcode: opcode.into(),
            reason: reason.into(),
        }
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        BackendError::UnreachableState {
            reason: reason.into(),
        }
    }

    /// Short stable code used in rendered diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::MalformedInstruction { .. } => "E101",
            BackendError::LiteralOutOfRange { .. } => "E102",
            BackendError::UnknownLabel { .. } => "E103",
            BackendError::DuplicateLabel { .. } => "E104",
            BackendError::UnreachableState { .. } => "E199",
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
