//! Runtime error kinds raised by the operator library. The emitted code
//! never catches these; the error-trapping facade does.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("type mismatch")]
    TypeMismatch,
    #[error("overflow")]
    Overflow,
    #[error("invalid use of Null")]
    InvalidUseOfNull,
    #[error("division by zero")]
    DivisionByZero,
    #[error("object required")]
    ObjectRequired,
    #[error("comparison between these types is not supported")]
    UnsupportedComparison,
    #[error("error {number}: {description}")]
    Raised { number: i32, description: String },
}

impl RuntimeError {
    /// Classic VBScript error number for the kind
    pub fn number(&self) -> i32 {
        match self {
            RuntimeError::TypeMismatch => 13,
            RuntimeError::Overflow => 6,
            RuntimeError::InvalidUseOfNull => 94,
            RuntimeError::DivisionByZero => 11,
            RuntimeError::ObjectRequired => 424,
            RuntimeError::UnsupportedComparison => 13,
            RuntimeError::Raised { number, .. } => *number,
        }
    }
}
