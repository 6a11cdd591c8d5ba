use thiserror::Error;

/// A parse failure: exit code 2, message names the offending construct.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("syntax error: {message}")]
pub struct SyntaxError {
    pub message: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Runtime shell errors surfaced on stderr.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ShellError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("{0}")]
    Expansion(String),
    #[error("arithmetic: {0}")]
    Arith(String),
}
