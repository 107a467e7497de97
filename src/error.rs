use thiserror::Error;

use crate::scanner::Token;
use crate::value::Value;

/// Error raised while evaluating a program. Carries the line of the token the
/// evaluation tripped over; the display format is the diagnostic the driver
/// writes to stderr.
#[derive(Debug, Clone, Error)]
#[error("{message}\n[line {line}]")]
pub struct RuntimeError {
    pub message: String,
    pub line: u64,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> RuntimeError {
        RuntimeError {
            message: message.into(),
            line: token.line,
        }
    }
}

/// Non-local exit channel for the tree walkers. `Return` is ordinary control
/// flow: it is raised by a `return` statement and caught at the innermost
/// function-call frame, never by runtime error handling.
pub enum Unwind {
    Err(RuntimeError),
    Return(Value),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Unwind {
        Unwind::Err(err)
    }
}

pub type RunResult<T> = Result<T, Unwind>;
